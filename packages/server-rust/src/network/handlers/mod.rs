//! HTTP handler definitions for the Canteen server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod admin;
pub mod catalog;
pub mod favorites;
pub mod health;
pub mod orders;
pub mod session;

pub use admin::update_status_handler;
pub use catalog::{index_handler, order_menu_handler};
pub use favorites::{add_favorite_handler, list_favorites_handler, remove_favorite_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use orders::{order_status_handler, place_order_handler};
pub use session::{login_handler, logout_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::auth::{AuthorizationChain, SessionAuthenticator};
use crate::service::{CatalogService, FavoritesService, LoginService, OrderService};
use crate::storage::CacheEngine;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Cache backend, pinged by the readiness probe.
    pub cache: Arc<dyn CacheEngine>,
    pub authenticator: Arc<SessionAuthenticator>,
    pub chain: Arc<AuthorizationChain>,
    pub login: Arc<LoginService>,
    pub catalog: Arc<CatalogService>,
    pub favorites: Arc<FavoritesService>,
    pub orders: Arc<OrderService>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

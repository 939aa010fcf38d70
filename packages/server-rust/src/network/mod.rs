//! HTTP surface: configuration, routing, interceptors, error mapping and
//! shutdown control.

pub mod config;
pub mod error;
pub mod handlers;
pub mod interceptor;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::NetworkConfig;
pub use error::ApiError;
pub use handlers::AppState;
pub use interceptor::{CurrentUser, TOKEN_HEADER};
pub use module::{build_router, NetworkModule};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

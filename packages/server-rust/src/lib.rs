//! Canteen server: token sessions, an authorization chain, cache-resident
//! status bitmaps, event-driven counters and asynchronous order processing,
//! all over a pluggable cache engine and persistent catalog store.

pub mod app;
pub mod auth;
pub mod network;
pub mod notify;
pub mod orders;
pub mod overlay;
pub mod service;
pub mod storage;
pub mod traits;

pub use app::Canteen;
pub use traits::{CatalogStore, StockOutcome};

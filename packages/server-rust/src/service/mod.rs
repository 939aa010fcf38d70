//! Application services behind the HTTP routes.
//!
//! 1. **Login** (`login`): upstream identity exchange and session issue
//! 2. **Catalog** (`catalog`): visibility-filtered pages and status updates
//! 3. **Favorites** (`favorites`): per-user favorites and their counter events
//! 4. **Orders** (`orders`): order placement and completion polling
//! 5. **Background workers** (`worker`): order consumption, counter flushing

pub mod catalog;
pub mod config;
pub mod favorites;
pub mod login;
pub mod orders;
pub mod worker;

pub use catalog::{CatalogError, CatalogService, DishSummary, IndexPage};
pub use config::{AppConfig, AuthConfig, CatalogConfig, CounterConfig, OrderConfig, WeChatConfig};
pub use favorites::{FavoritesError, FavoritesService};
pub use login::{
    Identity, IdentityProvider, LoginError, LoginService, WeChatIdentityProvider, TOKEN_SUBJECT,
};
pub use orders::{OrderError, OrderService};
pub use worker::{BackgroundRunnable, BackgroundWorker};

//! Storage for the Canteen server.
//!
//! Two layers:
//!
//! - **Cache** ([`CacheEngine`]): fast key/value store holding sessions,
//!   status bitmaps, completion codes and counter deltas
//! - **Persistent store** ([`CatalogStore`](crate::traits::CatalogStore)):
//!   the slower source of truth the cache is rebuilt from

pub mod datastores;
pub mod engine;
pub mod engines;
pub mod record;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::*;
pub use record::*;

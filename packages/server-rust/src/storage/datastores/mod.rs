//! `CatalogStore` implementations.
//!
//! Provides concrete backends for the [`CatalogStore`](crate::traits::CatalogStore) trait.
//! Currently includes [`MemoryCatalog`] for development and tests.

mod memory;

pub use memory::{CatalogSeed, MemoryCatalog};

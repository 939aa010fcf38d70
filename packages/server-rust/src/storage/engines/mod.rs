//! `CacheEngine` implementations.

mod hashmap;
#[cfg(feature = "redis")]
mod redis;

pub use hashmap::HashMapCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

//! Cache engine trait.
//!
//! Defines [`CacheEngine`], the key/value cache every stateful component
//! talks to. The operation set is the subset of Redis semantics the server
//! relies on: strings with TTL, set-if-absent, integer counters with atomic
//! read-and-clear, and bitmaps addressed by bit offset. Each call is atomic
//! for the single key it touches.

use std::time::Duration;

use async_trait::async_trait;

use super::record::Bitmap;

/// Failures surfaced by a [`CacheEngine`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key holds a value of a type the operation cannot use.
    #[error("cache key {key} holds a value of the wrong type")]
    WrongType { key: String },
    /// The key holds a value that cannot be parsed as the requested type.
    #[error("cache key {key} holds a corrupt value: {reason}")]
    Corrupt { key: String, reason: String },
    /// The backend could not be reached or failed the command.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    /// Returns `true` when the entry itself is bad, as opposed to the backend.
    #[must_use]
    pub fn is_entry_fault(&self) -> bool {
        matches!(self, CacheError::WrongType { .. } | CacheError::Corrupt { .. })
    }
}

/// Key/value cache with per-key atomic operations.
///
/// Wrapped in `Arc<dyn CacheEngine>` and shared across request handlers and
/// background workers. A `ttl` of `None` means the entry never expires.
#[async_trait]
pub trait CacheEngine: Send + Sync + 'static {
    /// Reads a text value.
    async fn get_text(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes a text value, replacing whatever the key held.
    async fn set_text(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), CacheError>;

    /// Reads an integer value.
    async fn get_int(&self, key: &str) -> Result<Option<i64>, CacheError>;

    /// Writes an integer only if the key is absent. Returns `true` if written.
    async fn set_int_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Adds `delta` to an integer, treating an absent key as 0. Returns the
    /// new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Reads an integer and deletes the key in one step. The key is deleted
    /// even when its value turns out to be unreadable.
    async fn take_int(&self, key: &str) -> Result<Option<i64>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Reads one bit. `None` when the key is absent, so callers can tell
    /// "no bitmap" apart from "bit cleared".
    async fn get_bit(&self, key: &str, offset: u32) -> Result<Option<bool>, CacheError>;

    /// Sets or clears one bit, creating the bitmap if absent. Returns the
    /// previous bit.
    async fn set_bit(&self, key: &str, offset: u32, on: bool) -> Result<bool, CacheError>;

    /// Like [`CacheEngine::set_bit`] but leaves an absent key absent.
    /// Returns the previous bit, or `None` when nothing was written.
    async fn set_bit_if_present(
        &self,
        key: &str,
        offset: u32,
        on: bool,
    ) -> Result<Option<bool>, CacheError>;

    /// Replaces the whole bitmap at `key`.
    async fn put_bitmap(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Writes the whole bitmap only if `key` is absent. Returns `true` if
    /// written.
    async fn put_bitmap_if_absent(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Round-trip health probe.
    async fn ping(&self) -> Result<(), CacheError>;
}

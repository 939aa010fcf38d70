//! Cache-resident sessions keyed by token digest.

use std::sync::Arc;
use std::time::Duration;

use canteen_core::{keys, UserId};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::storage::{CacheEngine, CacheError};

/// Maps live tokens to user ids.
///
/// A session exists from [`SessionStore::store`] until its TTL runs out or
/// it is invalidated. Lookups never extend the TTL.
pub struct SessionStore {
    cache: Arc<dyn CacheEngine>,
}

impl SessionStore {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheEngine>) -> Self {
        Self { cache }
    }

    /// Cache key for a token. Only the token's digest appears in the key.
    #[must_use]
    pub fn key_for(token: &str) -> String {
        keys::session(&hex::encode(Sha256::digest(token.as_bytes())))
    }

    /// Opens a session for `user_id` lasting `ttl`.
    ///
    /// A zero TTL leaves no observable session, and clears any previous one.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the write does not go through.
    pub async fn store(&self, token: &str, user_id: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = Self::key_for(token);
        if ttl.is_zero() {
            debug!(%key, "zero session ttl, nothing stored");
            self.cache.delete(&key).await?;
            return Ok(());
        }
        self.cache.set_text(&key, user_id, Some(ttl)).await
    }

    /// Returns the user owning a live session, or `None`.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the read does not go through.
    pub async fn lookup(&self, token: &str) -> Result<Option<UserId>, CacheError> {
        self.cache.get_text(&Self::key_for(token)).await
    }

    /// Returns `true` when no live session exists for `token`.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the read does not go through.
    pub async fn is_expired(&self, token: &str) -> Result<bool, CacheError> {
        Ok(!self.cache.exists(&Self::key_for(token)).await?)
    }

    /// Ends a session early. Returns `true` if one was live.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the delete does not go through.
    pub async fn invalidate(&self, token: &str) -> Result<bool, CacheError> {
        self.cache.delete(&Self::key_for(token)).await
    }
}

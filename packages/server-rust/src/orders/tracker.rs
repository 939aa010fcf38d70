//! Write-once completion codes for asynchronously processed orders.

use std::sync::Arc;
use std::time::Duration;

use canteen_core::{keys, CompletionCode};
use tracing::{debug, warn};

use crate::storage::{CacheEngine, CacheError};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("pending is not a terminal completion code")]
    PendingCode,
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Records the outcome of each order once, for clients to poll.
pub struct OrderCompletionTracker {
    cache: Arc<dyn CacheEngine>,
    ttl: Duration,
}

impl OrderCompletionTracker {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheEngine>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Current code for an order. [`CompletionCode::PENDING`] while nothing
    /// has been recorded, and again after the record expires.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the read does not go through.
    pub async fn is_complete(&self, order_id: &str) -> Result<CompletionCode, CacheError> {
        Ok(self
            .cache
            .get_int(&keys::order_completion(order_id))
            .await?
            .map_or(CompletionCode::PENDING, CompletionCode))
    }

    /// Records a terminal code. Returns `false` without writing if a code is
    /// already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PendingCode`] for [`CompletionCode::PENDING`]
    /// and the cache failure if the write does not go through.
    pub async fn record(&self, order_id: &str, code: CompletionCode) -> Result<bool, TrackerError> {
        if code.is_pending() {
            return Err(TrackerError::PendingCode);
        }
        let written = self
            .cache
            .set_int_if_absent(&keys::order_completion(order_id), code.0, Some(self.ttl))
            .await?;
        if written {
            debug!(order_id, code = code.label(), "order completion recorded");
        } else {
            warn!(order_id, code = code.label(), "order completion already recorded, ignoring");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use canteen_core::ManualClock;

    use super::*;
    use crate::storage::engines::HashMapCache;

    fn tracker() -> (OrderCompletionTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(HashMapCache::with_clock(clock.clone()));
        (
            OrderCompletionTracker::new(cache, Duration::from_secs(60)),
            clock,
        )
    }

    #[tokio::test]
    async fn unknown_order_is_pending() {
        let (tracker, _) = tracker();
        assert_eq!(
            tracker.is_complete("o-1").await.unwrap(),
            CompletionCode::PENDING
        );
    }

    #[tokio::test]
    async fn first_terminal_code_wins() {
        let (tracker, _) = tracker();
        assert!(tracker
            .record("o-1", CompletionCode::COMPLETED)
            .await
            .unwrap());
        assert!(!tracker
            .record("o-1", CompletionCode::REJECTED)
            .await
            .unwrap());
        assert_eq!(
            tracker.is_complete("o-1").await.unwrap(),
            CompletionCode::COMPLETED
        );
    }

    #[tokio::test]
    async fn pending_cannot_be_recorded() {
        let (tracker, _) = tracker();
        assert!(matches!(
            tracker.record("o-1", CompletionCode::PENDING).await,
            Err(TrackerError::PendingCode)
        ));
    }

    #[tokio::test]
    async fn record_expires_after_ttl() {
        let (tracker, clock) = tracker();
        tracker
            .record("o-1", CompletionCode::OUT_OF_STOCK)
            .await
            .unwrap();
        clock.advance(60_000);
        assert_eq!(
            tracker.is_complete("o-1").await.unwrap(),
            CompletionCode::PENDING
        );
    }
}

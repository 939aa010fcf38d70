//! Pending counter deltas held in the cache.

use std::sync::Arc;

use canteen_core::{keys, CounterDelta, CounterKind, EntityId};
use tracing::{error, trace, warn};

use crate::storage::{CacheEngine, CacheError};
use crate::traits::CatalogStore;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
}

/// Accumulates counter changes under `counter:delta:{kind}:{id}` until a
/// flush moves them into the persistent store.
pub struct CounterLedger {
    cache: Arc<dyn CacheEngine>,
    store: Arc<dyn CatalogStore>,
}

impl CounterLedger {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheEngine>, store: Arc<dyn CatalogStore>) -> Self {
        Self { cache, store }
    }

    /// Adds `delta` to an entity's pending counter. Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the increment does not go through.
    pub async fn record(
        &self,
        kind: CounterKind,
        entity_id: EntityId,
        delta: i64,
    ) -> Result<i64, CacheError> {
        self.cache
            .incr_by(&keys::counter_delta(kind, entity_id), delta)
            .await
    }

    /// Reads pending deltas over every known dish without clearing them.
    ///
    /// A missing entry means no change. An unreadable entry is logged,
    /// counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Cache`] when the cache is unavailable and
    /// [`LedgerError::Store`] when dish ids cannot be listed.
    pub async fn get_deltas(&self, kind: CounterKind) -> Result<Vec<CounterDelta>, LedgerError> {
        self.collect(kind, false).await
    }

    /// Reads and clears pending deltas. Each entity's read-and-clear is
    /// atomic, so increments racing with this call land in the next batch.
    ///
    /// # Errors
    ///
    /// See [`CounterLedger::get_deltas`]. If the cache fails partway, the
    /// deltas already taken are added back before the error is returned.
    pub async fn take_deltas(&self, kind: CounterKind) -> Result<Vec<CounterDelta>, LedgerError> {
        self.collect(kind, true).await
    }

    /// Adds previously taken deltas back, for example after a failed flush.
    ///
    /// # Errors
    ///
    /// Returns the first cache failure; later deltas are not restored.
    pub async fn restore(&self, kind: CounterKind, deltas: &[CounterDelta]) -> Result<(), CacheError> {
        for d in deltas {
            self.record(kind, d.entity_id, d.delta).await?;
        }
        Ok(())
    }

    async fn collect(&self, kind: CounterKind, clear: bool) -> Result<Vec<CounterDelta>, LedgerError> {
        let ids = self.store.dish_ids().await.map_err(LedgerError::Store)?;
        let mut deltas = Vec::new();
        for entity_id in ids {
            let key = keys::counter_delta(kind, entity_id);
            let read = if clear {
                self.cache.take_int(&key).await
            } else {
                self.cache.get_int(&key).await
            };
            match read {
                Ok(Some(0) | None) => trace!(%key, "no pending delta"),
                Ok(Some(delta)) => deltas.push(CounterDelta { entity_id, delta }),
                Err(e) if e.is_entry_fault() => {
                    warn!(%key, error = %e, "skipping unreadable counter delta");
                    metrics::counter!("canteen_counter_deltas_skipped_total", "kind" => kind.as_str())
                        .increment(1);
                }
                Err(e) => {
                    if clear && !deltas.is_empty() {
                        warn!(%kind, count = deltas.len(), error = %e, "take interrupted, restoring deltas");
                        if let Err(restore) = self.restore(kind, &deltas).await {
                            error!(%kind, error = %restore, "could not restore counter deltas");
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(deltas)
    }
}

//! Periodic flush of pending counter deltas into the persistent store.

use std::sync::Arc;

use async_trait::async_trait;
use canteen_core::CounterKind;
use tracing::{debug, error, info, warn};

use super::ledger::CounterLedger;
use crate::service::worker::BackgroundRunnable;
use crate::traits::CatalogStore;

/// Requests accepted by the flusher's worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushRequest {
    /// Flush one counter kind now.
    Kind(CounterKind),
    /// Flush every counter kind now.
    All,
}

/// Moves deltas from the cache into the store on every tick and on request.
///
/// Deltas are taken (read and cleared) before the store write. If the write
/// fails they are added back so the next flush retries them.
pub struct CounterFlusher {
    ledger: Arc<CounterLedger>,
    store: Arc<dyn CatalogStore>,
}

impl CounterFlusher {
    #[must_use]
    pub fn new(ledger: Arc<CounterLedger>, store: Arc<dyn CatalogStore>) -> Self {
        Self { ledger, store }
    }

    /// Flushes one counter kind. Returns how many entities were applied.
    ///
    /// # Errors
    ///
    /// Returns an error if deltas cannot be taken or the store rejects them.
    /// In the latter case the deltas are restored first.
    pub async fn flush(&self, kind: CounterKind) -> anyhow::Result<usize> {
        let deltas = self.ledger.take_deltas(kind).await?;
        if deltas.is_empty() {
            debug!(%kind, "nothing to flush");
            return Ok(0);
        }

        if let Err(e) = self.store.apply_counter_deltas(kind, &deltas).await {
            warn!(%kind, count = deltas.len(), error = %e, "flush failed, restoring deltas");
            if let Err(restore) = self.ledger.restore(kind, &deltas).await {
                error!(%kind, error = %restore, "could not restore counter deltas");
            }
            return Err(e);
        }

        info!(%kind, count = deltas.len(), "counter deltas flushed");
        metrics::counter!("canteen_counter_flushes_total", "kind" => kind.as_str()).increment(1);
        Ok(deltas.len())
    }

    async fn flush_all(&self) {
        for kind in CounterKind::ALL {
            if let Err(e) = self.flush(kind).await {
                warn!(%kind, error = %e, "counter flush skipped");
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for CounterFlusher {
    type Task = FlushRequest;

    async fn run(&mut self, task: FlushRequest) {
        match task {
            FlushRequest::Kind(kind) => {
                if let Err(e) = self.flush(kind).await {
                    warn!(%kind, error = %e, "counter flush skipped");
                }
            }
            FlushRequest::All => self.flush_all().await,
        }
    }

    async fn on_tick(&mut self) {
        self.flush_all().await;
    }

    async fn shutdown(&mut self) {
        self.flush_all().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use canteen_core::{Combo, ComboDish, CounterDelta, Dish, EntityId, UserId};

    use super::*;
    use crate::service::worker::BackgroundWorker;
    use crate::storage::datastores::{CatalogSeed, MemoryCatalog};
    use crate::storage::engines::HashMapCache;
    use crate::traits::StockOutcome;

    fn catalog() -> Arc<MemoryCatalog> {
        Arc::new(MemoryCatalog::from_seed(CatalogSeed {
            dishes: vec![Dish {
                id: 1,
                name: "d1".to_string(),
                price: 1.0,
                image: String::new(),
                sale: 10,
                like_count: 0,
                store_id: 1,
                tags: vec![],
                is_new: false,
                is_recommended: false,
            }],
            ..CatalogSeed::default()
        }))
    }

    /// Store that lists dish 1 but refuses counter writes.
    struct BrokenStore;

    #[async_trait]
    impl CatalogStore for BrokenStore {
        async fn dishes(&self) -> anyhow::Result<Vec<Dish>> {
            Ok(vec![])
        }
        async fn dishes_by_store(&self, _: u32) -> anyhow::Result<Vec<Dish>> {
            Ok(vec![])
        }
        async fn combos(&self) -> anyhow::Result<Vec<Combo>> {
            Ok(vec![])
        }
        async fn combo_composition(&self, _: EntityId) -> anyhow::Result<Option<Vec<ComboDish>>> {
            Ok(None)
        }
        async fn dish_ids(&self) -> anyhow::Result<Vec<EntityId>> {
            Ok(vec![1])
        }
        async fn entity_ids(&self) -> anyhow::Result<Vec<EntityId>> {
            Ok(vec![1])
        }
        async fn favorite_ids(&self, _: &str) -> anyhow::Result<Vec<EntityId>> {
            Ok(vec![])
        }
        async fn set_favorite(&self, _: &str, _: EntityId, _: bool) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn has_user(&self, _: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn add_user(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn record_order(
            &self,
            _: &str,
            _: &str,
            _: &BTreeMap<EntityId, u32>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn order_owner(&self, _: &str) -> anyhow::Result<Option<UserId>> {
            Ok(None)
        }
        async fn reserve_stock(&self, _: &BTreeMap<EntityId, u32>) -> anyhow::Result<StockOutcome> {
            Ok(StockOutcome::Reserved)
        }
        async fn release_stock(&self, _: &BTreeMap<EntityId, u32>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn apply_counter_deltas(&self, _: CounterKind, _: &[CounterDelta]) -> anyhow::Result<()> {
            anyhow::bail!("database is read-only")
        }
    }

    #[tokio::test]
    async fn flush_moves_deltas_into_store() {
        let store = catalog();
        let ledger = Arc::new(CounterLedger::new(Arc::new(HashMapCache::new()), store.clone()));
        ledger.record(CounterKind::Sales, 1, 4).await.unwrap();
        ledger.record(CounterKind::Likes, 1, 2).await.unwrap();

        let flusher = CounterFlusher::new(ledger.clone(), store.clone());
        assert_eq!(flusher.flush(CounterKind::Sales).await.unwrap(), 1);
        assert_eq!(flusher.flush(CounterKind::Sales).await.unwrap(), 0);
        assert_eq!(store.dish(1).unwrap().sale, 14);
        // Likes untouched until flushed.
        assert_eq!(store.dish(1).unwrap().like_count, 0);
        assert_eq!(ledger.get_deltas(CounterKind::Likes).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_store_write_restores_deltas() {
        let store: Arc<dyn CatalogStore> = Arc::new(BrokenStore);
        let ledger = Arc::new(CounterLedger::new(Arc::new(HashMapCache::new()), store.clone()));
        ledger.record(CounterKind::Likes, 1, 3).await.unwrap();

        let flusher = CounterFlusher::new(ledger.clone(), store);
        assert!(flusher.flush(CounterKind::Likes).await.is_err());
        assert_eq!(
            ledger.get_deltas(CounterKind::Likes).await.unwrap(),
            vec![CounterDelta {
                entity_id: 1,
                delta: 3
            }]
        );
    }

    #[tokio::test]
    async fn worker_flushes_on_request_and_shutdown() {
        let store = catalog();
        let ledger = Arc::new(CounterLedger::new(Arc::new(HashMapCache::new()), store.clone()));
        let worker = BackgroundWorker::start(
            "counter-flusher",
            CounterFlusher::new(ledger.clone(), store.clone()),
            8,
            Duration::from_secs(3_600),
        );

        ledger.record(CounterKind::Sales, 1, 1).await.unwrap();
        worker.submit(FlushRequest::All).await.unwrap();
        ledger.record(CounterKind::Likes, 1, 5).await.unwrap();
        worker.stop().await;

        let dish = store.dish(1).unwrap();
        assert_eq!(dish.sale, 11);
        assert_eq!(dish.like_count, 5);
    }
}

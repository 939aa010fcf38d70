//! Counter observers.

use std::sync::Arc;

use async_trait::async_trait;
use canteen_core::{is_combo_id, CounterKind};

use super::events::TriggerEvent;
use super::ledger::CounterLedger;
use super::notifier::Observer;

/// Moves a dish's pending like count by one per favorite change.
///
/// Combos carry no like counter, so their favorites are ignored here.
pub struct FavoriteCountObserver {
    ledger: Arc<CounterLedger>,
}

impl FavoriteCountObserver {
    #[must_use]
    pub fn new(ledger: Arc<CounterLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Observer for FavoriteCountObserver {
    fn name(&self) -> &'static str {
        "favorite-count"
    }

    async fn on_event(&self, _source: &'static str, event: &TriggerEvent) -> anyhow::Result<()> {
        let (entity_id, delta) = match event {
            TriggerEvent::DishFavorited { entity_id, .. } => (*entity_id, 1),
            TriggerEvent::DishUnfavorited { entity_id, .. } => (*entity_id, -1),
            TriggerEvent::OrderCompleted { .. } => return Ok(()),
        };
        if is_combo_id(entity_id) {
            return Ok(());
        }
        self.ledger
            .record(CounterKind::Likes, entity_id, delta)
            .await?;
        Ok(())
    }
}

/// Adds each completed order's dish quantities to the pending sales counts.
pub struct SalesCountObserver {
    ledger: Arc<CounterLedger>,
}

impl SalesCountObserver {
    #[must_use]
    pub fn new(ledger: Arc<CounterLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Observer for SalesCountObserver {
    fn name(&self) -> &'static str {
        "sales-count"
    }

    async fn on_event(&self, _source: &'static str, event: &TriggerEvent) -> anyhow::Result<()> {
        let TriggerEvent::OrderCompleted { dishes, .. } = event else {
            return Ok(());
        };
        for (&dish_id, &quantity) in dishes {
            self.ledger
                .record(CounterKind::Sales, dish_id, i64::from(quantity))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use canteen_core::{CounterDelta, Dish};

    use super::*;
    use crate::notify::notifier::CounterNotifier;
    use crate::storage::datastores::{CatalogSeed, MemoryCatalog};
    use crate::storage::engines::HashMapCache;

    fn ledger() -> Arc<CounterLedger> {
        let dishes = (1..=3)
            .map(|id| Dish {
                id,
                name: format!("d{id}"),
                price: 1.0,
                image: String::new(),
                sale: 0,
                like_count: 0,
                store_id: 1,
                tags: vec![],
                is_new: false,
                is_recommended: false,
            })
            .collect();
        let store = Arc::new(MemoryCatalog::from_seed(CatalogSeed {
            dishes,
            ..CatalogSeed::default()
        }));
        Arc::new(CounterLedger::new(Arc::new(HashMapCache::new()), store))
    }

    fn favorited(entity_id: u32) -> TriggerEvent {
        TriggerEvent::DishFavorited {
            user_id: "u".to_string(),
            entity_id,
        }
    }

    #[tokio::test]
    async fn favorite_events_move_likes() {
        let ledger = ledger();
        let notifier = CounterNotifier::new();
        notifier.register(Arc::new(FavoriteCountObserver::new(ledger.clone())), 0);

        notifier.fire("test", &favorited(1)).await;
        notifier.fire("test", &favorited(1)).await;
        notifier
            .fire(
                "test",
                &TriggerEvent::DishUnfavorited {
                    user_id: "u".to_string(),
                    entity_id: 2,
                },
            )
            .await;
        notifier.fire("test", &favorited(100_001)).await;

        let likes = ledger.get_deltas(CounterKind::Likes).await.unwrap();
        assert_eq!(
            likes,
            vec![
                CounterDelta {
                    entity_id: 1,
                    delta: 2
                },
                CounterDelta {
                    entity_id: 2,
                    delta: -1
                },
            ]
        );
    }

    #[tokio::test]
    async fn completed_orders_move_sales() {
        let ledger = ledger();
        let notifier = CounterNotifier::new();
        notifier.register(Arc::new(FavoriteCountObserver::new(ledger.clone())), 0);
        notifier.register(Arc::new(SalesCountObserver::new(ledger.clone())), 1);

        let report = notifier
            .fire(
                "test",
                &TriggerEvent::OrderCompleted {
                    order_id: "o".to_string(),
                    user_id: "u".to_string(),
                    dishes: BTreeMap::from([(1, 2), (3, 1)]),
                },
            )
            .await;
        assert_eq!(report.delivered, 2);

        let sales = ledger.get_deltas(CounterKind::Sales).await.unwrap();
        assert_eq!(sales.iter().map(|d| d.delta).sum::<i64>(), 3);
        assert!(ledger
            .get_deltas(CounterKind::Likes)
            .await
            .unwrap()
            .is_empty());
    }
}

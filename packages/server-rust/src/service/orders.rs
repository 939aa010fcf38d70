//! Order placement and status polling.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use canteen_core::{
    expand_line_items, is_combo_id, ClockSource, ComboDish, CompletionCode, EntityId, ExpandError,
    LineItem, OrderId, OrderMessage,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::orders::{OrderCompletionTracker, OrderQueue};
use crate::storage::CacheError;
use crate::traits::CatalogStore;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order has no line items")]
    EmptyOrder,
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error("order message could not be encoded")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
    #[error("order queue rejected the message")]
    Queue(#[source] anyhow::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Accepts orders and reports their processing state.
pub struct OrderService {
    store: Arc<dyn CatalogStore>,
    queue: Arc<dyn OrderQueue>,
    tracker: Arc<OrderCompletionTracker>,
    clock: Arc<dyn ClockSource>,
}

impl OrderService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        queue: Arc<dyn OrderQueue>,
        tracker: Arc<OrderCompletionTracker>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            store,
            queue,
            tracker,
            clock,
        }
    }

    /// Places an order and returns its id. Processing is asynchronous; poll
    /// [`OrderService::status`] for the outcome.
    ///
    /// Combos are expanded into their dishes before publish, so the consumer
    /// only sees dish quantities.
    ///
    /// # Errors
    ///
    /// - [`OrderError::EmptyOrder`] when `items` is empty
    /// - [`OrderError::Expand`] for zero quantities or unknown combos
    /// - store, encoding or queue failures. An order whose publish fails is
    ///   recorded as [`CompletionCode::REJECTED`]
    pub async fn place_order(
        &self,
        user_id: &str,
        items: &[LineItem],
    ) -> Result<OrderId, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let mut compositions: HashMap<EntityId, Vec<ComboDish>> = HashMap::new();
        for item in items.iter().filter(|i| is_combo_id(i.entity_id)) {
            if compositions.contains_key(&item.entity_id) {
                continue;
            }
            if let Some(parts) = self
                .store
                .combo_composition(item.entity_id)
                .await
                .map_err(OrderError::Store)?
            {
                compositions.insert(item.entity_id, parts);
            }
        }
        let dishes = expand_line_items(
            items.iter().map(|i| (i.entity_id, i.quantity)),
            |id| compositions.get(&id).cloned(),
        )?;

        let order_id = Uuid::new_v4().to_string();
        self.store
            .record_order(&order_id, user_id, &dishes)
            .await
            .map_err(OrderError::Store)?;

        let message = OrderMessage {
            order_id: order_id.clone(),
            user_id: user_id.to_string(),
            dishes,
            placed_at: self.clock.now(),
        };
        let payload = Bytes::from(message.encode()?);
        if let Err(e) = self.queue.publish(payload).await {
            error!(order_id, error = %e, "order publish failed");
            // The order row already exists; close it so it never polls as
            // pending.
            if let Err(record) = self.tracker.record(&order_id, CompletionCode::REJECTED).await {
                warn!(order_id, error = %record, "could not mark unpublished order rejected");
            }
            return Err(OrderError::Queue(e));
        }
        info!(order_id, user_id, units = message.unit_count(), "order placed");
        Ok(order_id)
    }

    /// Completion code for an order; `PENDING` until the consumer has run.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the code cannot be read.
    pub async fn status(&self, order_id: &str) -> Result<CompletionCode, OrderError> {
        Ok(self.tracker.is_complete(order_id).await?)
    }
}

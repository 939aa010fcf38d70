//! Order queue consumer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use canteen_core::{CompletionCode, OrderMessage};
use tracing::{error, info, warn};

use super::tracker::{OrderCompletionTracker, TrackerError};
use crate::notify::{CounterNotifier, TriggerEvent};
use crate::service::worker::BackgroundRunnable;
use crate::traits::{CatalogStore, StockOutcome};

/// Turns queued order messages into completion codes.
///
/// For each message: reserve stock in the store, record the outcome with
/// the tracker, and fire [`TriggerEvent::OrderCompleted`] on success. A
/// redelivered message whose outcome is already recorded is skipped.
pub struct OrderConsumer {
    store: Arc<dyn CatalogStore>,
    tracker: Arc<OrderCompletionTracker>,
    notifier: Arc<CounterNotifier>,
}

impl OrderConsumer {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        tracker: Arc<OrderCompletionTracker>,
        notifier: Arc<CounterNotifier>,
    ) -> Self {
        Self {
            store,
            tracker,
            notifier,
        }
    }

    /// Processes one encoded message and returns the resulting code.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode or the tracker
    /// cannot be read or written. When the outcome cannot be recorded after
    /// a retry, reserved stock is released before returning.
    pub async fn process(&self, payload: &[u8]) -> anyhow::Result<CompletionCode> {
        let message = OrderMessage::decode(payload)?;
        let order_id = message.order_id.as_str();

        let existing = self.tracker.is_complete(order_id).await?;
        if !existing.is_pending() {
            warn!(order_id, code = existing.label(), "duplicate order message skipped");
            return Ok(existing);
        }

        let code = match self.store.reserve_stock(&message.dishes).await {
            Ok(StockOutcome::Reserved) => CompletionCode::COMPLETED,
            Ok(StockOutcome::Insufficient { dish_id }) => {
                info!(order_id, dish_id, "order short of stock");
                CompletionCode::OUT_OF_STOCK
            }
            Ok(StockOutcome::UnknownDish { dish_id }) => {
                warn!(order_id, dish_id, "order names an unknown dish");
                CompletionCode::REJECTED
            }
            Err(e) => {
                error!(order_id, error = %e, "stock reservation failed");
                CompletionCode::REJECTED
            }
        };

        let fresh = match self.record_with_retry(order_id, code).await {
            Ok(fresh) => fresh,
            Err(e) => {
                if code == CompletionCode::COMPLETED {
                    if let Err(release) = self.store.release_stock(&message.dishes).await {
                        error!(order_id, error = %release, "could not release reserved stock");
                    } else {
                        warn!(order_id, "completion not recorded, stock released");
                    }
                }
                return Err(e.into());
            }
        };
        metrics::counter!("canteen_orders_processed_total", "outcome" => code.label())
            .increment(1);

        if fresh && code == CompletionCode::COMPLETED {
            let report = self
                .notifier
                .fire(
                    "order-consumer",
                    &TriggerEvent::OrderCompleted {
                        order_id: message.order_id.clone(),
                        user_id: message.user_id.clone(),
                        dishes: message.dishes.clone(),
                    },
                )
                .await;
            if !report.is_clean() {
                warn!(order_id, failures = report.failures.len(), "order observers failed");
            }
        }
        Ok(code)
    }

    /// Records the outcome, trying the write a second time if the first
    /// one fails.
    async fn record_with_retry(
        &self,
        order_id: &str,
        code: CompletionCode,
    ) -> Result<bool, TrackerError> {
        match self.tracker.record(order_id, code).await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                warn!(order_id, error = %e, "recording order completion failed, retrying");
                self.tracker.record(order_id, code).await
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for OrderConsumer {
    type Task = Bytes;

    async fn run(&mut self, payload: Bytes) {
        if let Err(e) = self.process(&payload).await {
            error!(error = %e, "order message dropped");
        }
    }
}

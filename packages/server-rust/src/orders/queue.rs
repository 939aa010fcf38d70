//! Order message broker seam.

use async_trait::async_trait;
use bytes::Bytes;

use super::consumer::OrderConsumer;
use crate::service::worker::BackgroundWorker;

/// Carries encoded [`OrderMessage`](canteen_core::OrderMessage)s from the
/// order service to the consumer. One publish per placed order.
#[async_trait]
pub trait OrderQueue: Send + Sync {
    /// Hands one encoded message to the broker.
    async fn publish(&self, payload: Bytes) -> anyhow::Result<()>;
}

/// In-process broker: a bounded channel drained by an [`OrderConsumer`]
/// running on a [`BackgroundWorker`].
pub struct InProcessQueue {
    worker: BackgroundWorker<OrderConsumer>,
}

impl InProcessQueue {
    #[must_use]
    pub fn new(worker: BackgroundWorker<OrderConsumer>) -> Self {
        Self { worker }
    }

    /// Stops consuming after draining messages already queued.
    pub async fn stop(&self) {
        self.worker.stop().await;
    }
}

#[async_trait]
impl OrderQueue for InProcessQueue {
    async fn publish(&self, payload: Bytes) -> anyhow::Result<()> {
        self.worker.submit(payload).await
    }
}

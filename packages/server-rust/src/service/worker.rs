//! Background worker for queued and periodic tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from a
//! bounded mpsc channel via a `BackgroundRunnable` implementation, with
//! periodic tick callbacks. The order queue consumer and the counter flusher
//! both run on it.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down, after queued tasks
    /// have been drained. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Handle to a spawned worker task.
///
/// All methods take `&self`, so the handle can be shared behind an `Arc`.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    name: &'static str,
    tx: Mutex<Option<mpsc::Sender<R::Task>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker loop.
    ///
    /// The loop runs `runnable` against queued tasks and calls `on_tick`
    /// every `tick_interval`. At most `capacity` tasks wait in the channel;
    /// `submit` applies backpressure beyond that.
    pub fn start(
        name: &'static str,
        mut runnable: R,
        capacity: usize,
        tick_interval: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(tick_interval);
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            ticks.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = ticks.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => {
                        // Finish what was already accepted.
                        rx.close();
                        while let Some(t) = rx.recv().await {
                            runnable.run(t).await;
                        }
                        break;
                    }
                }
            }

            runnable.shutdown().await;
            debug!(worker = name, "worker stopped");
        });

        Self {
            name,
            tx: Mutex::new(Some(tx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Submit a task to the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker {} channel closed", self.name)),
            None => Err(anyhow::anyhow!("worker {} not running", self.name)),
        }
    }

    /// Stops the worker, waiting for queued tasks and `shutdown` to finish.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        self.tx.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

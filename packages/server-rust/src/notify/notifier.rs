//! Observer registry and fan-out.
//!
//! Defines [`Observer`] for reacting to [`TriggerEvent`]s and
//! [`CounterNotifier`], which invokes every registered observer in priority
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{trace, warn};

use super::events::TriggerEvent;

/// Reacts to trigger events.
///
/// Used as `Arc<dyn Observer>`.
#[async_trait]
pub trait Observer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handles one event. `source` names the component that fired it.
    async fn on_event(&self, source: &'static str, event: &TriggerEvent) -> anyhow::Result<()>;
}

/// One observer that failed while handling an event.
#[derive(Debug)]
pub struct ObserverFailure {
    pub observer: &'static str,
    pub error: anyhow::Error,
}

/// Outcome of one [`CounterNotifier::fire`].
#[derive(Debug, Default)]
pub struct FireReport {
    pub delivered: usize,
    pub failures: Vec<ObserverFailure>,
}

impl FireReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Registration {
    priority: i32,
    observer: Arc<dyn Observer>,
}

/// Fan-out to observers, lowest priority value first.
///
/// Observers with equal priority run in registration order. A failing
/// observer does not stop the others; its error is logged, counted and
/// returned in the [`FireReport`].
#[derive(Default)]
pub struct CounterNotifier {
    observers: RwLock<Vec<Registration>>,
}

impl CounterNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn Observer>, priority: i32) {
        let mut observers = self.observers.write();
        // After every registration with priority <= this one: stable order.
        let at = observers.partition_point(|r| r.priority <= priority);
        observers.insert(at, Registration { priority, observer });
    }

    /// Removes every observer registered under `name`. Returns how many.
    pub fn unregister(&self, name: &str) -> usize {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|r| r.observer.name() != name);
        before - observers.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Invokes every observer with `event`, one after another.
    pub async fn fire(&self, source: &'static str, event: &TriggerEvent) -> FireReport {
        let snapshot: Vec<Arc<dyn Observer>> = self
            .observers
            .read()
            .iter()
            .map(|r| r.observer.clone())
            .collect();

        let mut report = FireReport::default();
        for observer in snapshot {
            let name = observer.name();
            match observer.on_event(source, event).await {
                Ok(()) => {
                    trace!(observer = name, event = event.kind(), "observer notified");
                    report.delivered += 1;
                }
                Err(error) => {
                    warn!(observer = name, event = event.kind(), source, error = %error, "observer failed");
                    metrics::counter!("canteen_observer_failures_total", "observer" => name)
                        .increment(1);
                    report.failures.push(ObserverFailure {
                        observer: name,
                        error,
                    });
                }
            }
        }
        report
    }
}

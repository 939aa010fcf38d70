//! Event fan-out and denormalized counters.
//!
//! [`CounterNotifier`] delivers [`TriggerEvent`]s to prioritized
//! [`Observer`]s. The concrete observers accumulate deltas in the
//! [`CounterLedger`], which the [`CounterFlusher`] periodically moves into
//! the persistent store.

pub mod events;
pub mod flusher;
pub mod ledger;
pub mod notifier;
pub mod observers;

pub use events::TriggerEvent;
pub use flusher::{CounterFlusher, FlushRequest};
pub use ledger::{CounterLedger, LedgerError};
pub use notifier::{CounterNotifier, FireReport, Observer, ObserverFailure};
pub use observers::{FavoriteCountObserver, SalesCountObserver};

//! Asynchronous order processing.
//!
//! Placed orders travel as encoded messages over an [`OrderQueue`]. The
//! [`OrderConsumer`] reserves stock and writes the outcome into the
//! [`OrderCompletionTracker`], which clients poll.

pub mod consumer;
pub mod queue;
pub mod tracker;

pub use consumer::OrderConsumer;
pub use queue::{InProcessQueue, OrderQueue};
pub use tracker::{OrderCompletionTracker, TrackerError};

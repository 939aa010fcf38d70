//! Canteen core: catalog records, status axes, cache keyspace and order messages.

pub mod clock;
pub mod context;
pub mod keys;
pub mod order;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::RequestContext;
pub use order::{expand_line_items, ExpandError, OrderMessage};
pub use types::{
    is_combo_id, Combo, ComboDish, CompletionCode, CounterDelta, CounterKind, Dish, EntityId,
    LineItem, OrderId, StatusAxis, UserId, COMBO_ID_THRESHOLD,
};


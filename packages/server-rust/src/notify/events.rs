use std::collections::BTreeMap;

use canteen_core::{EntityId, OrderId, UserId};

/// Domain events that move denormalized counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    DishFavorited {
        user_id: UserId,
        entity_id: EntityId,
    },
    DishUnfavorited {
        user_id: UserId,
        entity_id: EntityId,
    },
    /// An order was accepted. `dishes` holds expanded per-dish quantities.
    OrderCompleted {
        order_id: OrderId,
        user_id: UserId,
        dishes: BTreeMap<EntityId, u32>,
    },
}

impl TriggerEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::DishFavorited { .. } => "dish-favorited",
            TriggerEvent::DishUnfavorited { .. } => "dish-unfavorited",
            TriggerEvent::OrderCompleted { .. } => "order-completed",
        }
    }
}

//! Order messages carried over the order queue, and combo expansion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{is_combo_id, ComboDish, EntityId, OrderId, UserId};

/// A placed order as published to the order queue.
///
/// `dishes` holds plain dish ids only; combos are expanded before publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub dishes: BTreeMap<EntityId, u32>,
    /// Placement time in milliseconds since Unix epoch.
    pub placed_at: u64,
}

impl OrderMessage {
    /// Encodes the message as named-field `MessagePack`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Decodes a message produced by [`OrderMessage::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid encoded message.
    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }

    /// Total number of dish units in the order.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.dishes.values().map(|&q| u64::from(q)).sum()
    }
}

/// Failure to expand an order's line items.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("line item {0} has zero quantity")]
    ZeroQuantity(EntityId),
    #[error("combo {0} has no known composition")]
    UnknownCombo(EntityId),
    #[error("quantity overflow while expanding entity {0}")]
    Overflow(EntityId),
}

/// Expands line items into per-dish quantities.
///
/// Dish lines are summed by id. A combo line contributes
/// `constituent.quantity * line.quantity` of each constituent dish, summed
/// with any other lines naming the same dish. `composition` resolves a combo
/// id to its constituents.
///
/// # Errors
///
/// Returns [`ExpandError`] for zero quantities, combos with no composition,
/// or quantities that overflow `u32`.
pub fn expand_line_items<I, F>(
    items: I,
    mut composition: F,
) -> Result<BTreeMap<EntityId, u32>, ExpandError>
where
    I: IntoIterator<Item = (EntityId, u32)>,
    F: FnMut(EntityId) -> Option<Vec<ComboDish>>,
{
    let mut expanded: BTreeMap<EntityId, u32> = BTreeMap::new();

    let mut add = |dish_id: EntityId, quantity: u32| -> Result<(), ExpandError> {
        let slot = expanded.entry(dish_id).or_insert(0);
        *slot = slot
            .checked_add(quantity)
            .ok_or(ExpandError::Overflow(dish_id))?;
        Ok(())
    };

    for (entity_id, quantity) in items {
        if quantity == 0 {
            return Err(ExpandError::ZeroQuantity(entity_id));
        }
        if !is_combo_id(entity_id) {
            add(entity_id, quantity)?;
            continue;
        }
        let parts = composition(entity_id).ok_or(ExpandError::UnknownCombo(entity_id))?;
        for part in parts {
            let units = part
                .quantity
                .checked_mul(quantity)
                .ok_or(ExpandError::Overflow(entity_id))?;
            add(part.dish_id, units)?;
        }
    }

    Ok(expanded)
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use canteen_core::{Combo, ComboDish, CounterDelta, CounterKind, Dish, EntityId, UserId};

/// Result of trying to reserve stock for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockOutcome {
    /// Every dish had enough stock; all of it is now reserved.
    Reserved,
    /// At least one dish is short. Nothing was reserved.
    Insufficient { dish_id: EntityId },
    /// The order names a dish the catalog does not know. Nothing was reserved.
    UnknownDish { dish_id: EntityId },
}

/// Pluggable persistent store behind the cache.
///
/// Holds the source of truth for the catalog, users, favorites and orders.
/// The cache layer rebuilds from it on a miss and flushes counter deltas
/// into it. Implementations: in-memory (development, tests), SQL (future).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every dish in the catalog.
    async fn dishes(&self) -> anyhow::Result<Vec<Dish>>;

    /// Dishes sold by one store front.
    async fn dishes_by_store(&self, store_id: u32) -> anyhow::Result<Vec<Dish>>;

    /// Every combo in the catalog.
    async fn combos(&self) -> anyhow::Result<Vec<Combo>>;

    /// Constituents of one combo, or `None` if the combo does not exist.
    async fn combo_composition(&self, combo_id: EntityId)
        -> anyhow::Result<Option<Vec<ComboDish>>>;

    /// Ids of every dish (not combos).
    async fn dish_ids(&self) -> anyhow::Result<Vec<EntityId>>;

    /// Ids of every dish and combo: the universe status bitmaps index.
    async fn entity_ids(&self) -> anyhow::Result<Vec<EntityId>>;

    /// Entities the user has favorited.
    async fn favorite_ids(&self, user_id: &str) -> anyhow::Result<Vec<EntityId>>;

    /// Adds or removes a favorite. Returns `true` if the stored state changed.
    async fn set_favorite(&self, user_id: &str, entity_id: EntityId, on: bool)
        -> anyhow::Result<bool>;

    async fn has_user(&self, user_id: &str) -> anyhow::Result<bool>;

    /// Creates a user row. Adding an existing user is a no-op.
    async fn add_user(&self, user_id: &str) -> anyhow::Result<()>;

    /// Records a newly placed order as owned by `user_id`.
    async fn record_order(
        &self,
        order_id: &str,
        user_id: &str,
        dishes: &BTreeMap<EntityId, u32>,
    ) -> anyhow::Result<()>;

    /// Owner of an order, or `None` if the order does not exist.
    async fn order_owner(&self, order_id: &str) -> anyhow::Result<Option<UserId>>;

    /// Atomically reserves stock for every dish, or nothing at all.
    async fn reserve_stock(&self, dishes: &BTreeMap<EntityId, u32>)
        -> anyhow::Result<StockOutcome>;

    /// Returns previously reserved units. Dishes with unlimited stock are
    /// left alone.
    async fn release_stock(&self, dishes: &BTreeMap<EntityId, u32>) -> anyhow::Result<()>;

    /// Applies counter deltas to the persisted counters.
    async fn apply_counter_deltas(
        &self,
        kind: CounterKind,
        deltas: &[CounterDelta],
    ) -> anyhow::Result<()>;
}

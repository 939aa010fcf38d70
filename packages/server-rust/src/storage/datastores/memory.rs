//! In-memory [`CatalogStore`] implementation.
//!
//! [`MemoryCatalog`] keeps the whole catalog behind one `parking_lot`
//! lock. It backs development runs (seeded from a JSON file) and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use canteen_core::{
    is_combo_id, Combo, ComboDish, CounterDelta, CounterKind, Dish, EntityId, OrderId, UserId,
};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::traits::{CatalogStore, StockOutcome};

/// Initial contents of a [`MemoryCatalog`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub dishes: Vec<Dish>,
    #[serde(default)]
    pub combos: Vec<Combo>,
    /// Units on hand per dish. Dishes without an entry have unlimited stock.
    #[serde(default)]
    pub stock: BTreeMap<EntityId, u32>,
    #[serde(default)]
    pub users: Vec<UserId>,
}

impl CatalogSeed {
    /// Reads a seed from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog seed {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing catalog seed {}", path.display()))
    }
}

#[derive(Default)]
struct CatalogData {
    dishes: BTreeMap<EntityId, Dish>,
    combos: BTreeMap<EntityId, Combo>,
    stock: HashMap<EntityId, u32>,
    users: HashSet<UserId>,
    favorites: HashMap<UserId, BTreeSet<EntityId>>,
    orders: HashMap<OrderId, UserId>,
}

/// In-memory catalog store.
#[derive(Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
    favorite_reads: AtomicU64,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let data = CatalogData {
            dishes: seed.dishes.into_iter().map(|d| (d.id, d)).collect(),
            combos: seed.combos.into_iter().map(|c| (c.id, c)).collect(),
            stock: seed.stock.into_iter().collect(),
            users: seed.users.into_iter().collect(),
            ..CatalogData::default()
        };
        Self {
            data: RwLock::new(data),
            favorite_reads: AtomicU64::new(0),
        }
    }

    /// Number of times the favorites list has been read. Lets callers see how
    /// often the cache fell through to the store.
    #[must_use]
    pub fn favorite_reads(&self) -> u64 {
        self.favorite_reads.load(Ordering::Relaxed)
    }

    /// Ids of every recorded order, sorted.
    #[must_use]
    pub fn order_ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<_> = self.data.read().orders.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current stock for a dish. `None` means unlimited.
    #[must_use]
    pub fn stock_of(&self, dish_id: EntityId) -> Option<u32> {
        self.data.read().stock.get(&dish_id).copied()
    }

    #[must_use]
    pub fn dish(&self, dish_id: EntityId) -> Option<Dish> {
        self.data.read().dishes.get(&dish_id).cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn dishes(&self) -> anyhow::Result<Vec<Dish>> {
        Ok(self.data.read().dishes.values().cloned().collect())
    }

    async fn dishes_by_store(&self, store_id: u32) -> anyhow::Result<Vec<Dish>> {
        Ok(self
            .data
            .read()
            .dishes
            .values()
            .filter(|d| d.store_id == store_id)
            .cloned()
            .collect())
    }

    async fn combos(&self) -> anyhow::Result<Vec<Combo>> {
        Ok(self.data.read().combos.values().cloned().collect())
    }

    async fn combo_composition(
        &self,
        combo_id: EntityId,
    ) -> anyhow::Result<Option<Vec<ComboDish>>> {
        Ok(self
            .data
            .read()
            .combos
            .get(&combo_id)
            .map(|c| c.dishes.clone()))
    }

    async fn dish_ids(&self) -> anyhow::Result<Vec<EntityId>> {
        Ok(self.data.read().dishes.keys().copied().collect())
    }

    async fn entity_ids(&self) -> anyhow::Result<Vec<EntityId>> {
        let data = self.data.read();
        Ok(data
            .dishes
            .keys()
            .chain(data.combos.keys())
            .copied()
            .collect())
    }

    async fn favorite_ids(&self, user_id: &str) -> anyhow::Result<Vec<EntityId>> {
        self.favorite_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .data
            .read()
            .favorites
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn set_favorite(
        &self,
        user_id: &str,
        entity_id: EntityId,
        on: bool,
    ) -> anyhow::Result<bool> {
        let mut data = self.data.write();
        let set = data.favorites.entry(user_id.to_string()).or_default();
        Ok(if on {
            set.insert(entity_id)
        } else {
            set.remove(&entity_id)
        })
    }

    async fn has_user(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.data.read().users.contains(user_id))
    }

    async fn add_user(&self, user_id: &str) -> anyhow::Result<()> {
        self.data.write().users.insert(user_id.to_string());
        Ok(())
    }

    async fn record_order(
        &self,
        order_id: &str,
        user_id: &str,
        _dishes: &BTreeMap<EntityId, u32>,
    ) -> anyhow::Result<()> {
        let mut data = self.data.write();
        if data.orders.contains_key(order_id) {
            anyhow::bail!("order {order_id} already exists");
        }
        data.orders
            .insert(order_id.to_string(), user_id.to_string());
        Ok(())
    }

    async fn order_owner(&self, order_id: &str) -> anyhow::Result<Option<UserId>> {
        Ok(self.data.read().orders.get(order_id).cloned())
    }

    async fn reserve_stock(
        &self,
        dishes: &BTreeMap<EntityId, u32>,
    ) -> anyhow::Result<StockOutcome> {
        let mut data = self.data.write();
        for (&dish_id, &wanted) in dishes {
            if !data.dishes.contains_key(&dish_id) {
                return Ok(StockOutcome::UnknownDish { dish_id });
            }
            if data.stock.get(&dish_id).is_some_and(|&have| have < wanted) {
                return Ok(StockOutcome::Insufficient { dish_id });
            }
        }
        for (dish_id, wanted) in dishes {
            if let Some(have) = data.stock.get_mut(dish_id) {
                *have -= wanted;
            }
        }
        Ok(StockOutcome::Reserved)
    }

    async fn release_stock(&self, dishes: &BTreeMap<EntityId, u32>) -> anyhow::Result<()> {
        let mut data = self.data.write();
        for (dish_id, units) in dishes {
            if let Some(have) = data.stock.get_mut(dish_id) {
                *have = have.saturating_add(*units);
            }
        }
        Ok(())
    }

    async fn apply_counter_deltas(
        &self,
        kind: CounterKind,
        deltas: &[CounterDelta],
    ) -> anyhow::Result<()> {
        let mut data = self.data.write();
        for delta in deltas {
            if is_combo_id(delta.entity_id) {
                continue;
            }
            let Some(dish) = data.dishes.get_mut(&delta.entity_id) else {
                continue;
            };
            match kind {
                CounterKind::Likes => dish.like_count = dish.like_count.saturating_add(delta.delta),
                CounterKind::Sales => {
                    dish.sale = dish.sale.saturating_add_signed(delta.delta);
                }
            }
        }
        Ok(())
    }
}

//! Cache-resident visibility flags layered over the persistent catalog.
//!
//! Each [`StatusAxis`] is a bitmap indexed by entity id. A missing global
//! bitmap means every entity is visible on that axis; the first write seeds
//! it with every catalog entity visible. Per-user favorite
//! bitmaps are rebuilt from the persistent favorites list whenever they are
//! missing or unreadable, then read once more.

mod guard;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use canteen_core::{keys, Combo, Dish, EntityId, StatusAxis};
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub use guard::StatusGuard;

use crate::storage::{Bitmap, CacheEngine, CacheError};
use crate::traits::CatalogStore;

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The cache could not serve a status read even after a rebuild.
    #[error("status cache unavailable at {key}")]
    CacheUnavailable {
        key: String,
        #[source]
        source: CacheError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
    #[error("axis {0} is stored per user")]
    UserScopedAxis(StatusAxis),
    #[error("entity {0} is not in the catalog")]
    UnknownEntity(EntityId),
}

/// Visibility reads and writes over the status bitmaps.
pub struct StatusOverlay {
    cache: Arc<dyn CacheEngine>,
    store: Arc<dyn CatalogStore>,
    guard: Arc<StatusGuard>,
    favorite_ttl: Option<Duration>,
}

impl StatusOverlay {
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheEngine>,
        store: Arc<dyn CatalogStore>,
        guard: Arc<StatusGuard>,
        favorite_ttl: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            store,
            guard,
            favorite_ttl,
        }
    }

    // -----------------------------------------------------------------------
    // Global axes
    // -----------------------------------------------------------------------

    /// Absent bitmap: visible. Otherwise the entity's bit.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::UserScopedAxis`] for per-user axes and the
    /// cache failure if the bitmap cannot be read.
    pub async fn is_visible(&self, axis: StatusAxis, id: EntityId) -> Result<bool, OverlayError> {
        if axis.is_user_scoped() {
            return Err(OverlayError::UserScopedAxis(axis));
        }
        Ok(self
            .cache
            .get_bit(&keys::status(axis), id)
            .await?
            .unwrap_or(true))
    }

    /// AND of [`StatusOverlay::is_visible`] over `axes`. An empty set passes.
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn is_visible_on_all(
        &self,
        axes: &[StatusAxis],
        id: EntityId,
    ) -> Result<bool, OverlayError> {
        for &axis in axes {
            if !self.is_visible(axis, id).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A combo is visible when every constituent dish is published and the
    /// combo itself is published on the combo axis.
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn is_combo_visible(&self, combo: &Combo) -> Result<bool, OverlayError> {
        for part in &combo.dishes {
            if !self.is_visible(StatusAxis::Publish, part.dish_id).await? {
                return Ok(false);
            }
        }
        self.is_visible(StatusAxis::ComboPublish, combo.id).await
    }

    /// Holds the read side of the guard until the returned view is dropped.
    ///
    /// Use one view for every list that must come from the same generation
    /// of the bitmaps. Do not call the guarded methods of the overlay while
    /// holding it: a queued writer would block them forever.
    pub async fn reader(&self) -> StatusReader<'_> {
        StatusReader {
            overlay: self,
            _guard: self.guard.read().await,
        }
    }

    /// Holds the write side of the guard until the returned view is dropped.
    pub async fn writer(&self) -> StatusWriter<'_> {
        StatusWriter {
            overlay: self,
            _guard: self.guard.write().await,
        }
    }

    /// Keeps the dishes visible on every axis in `axes`, preserving order.
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn filter_dishes(
        &self,
        dishes: Vec<Dish>,
        axes: &[StatusAxis],
    ) -> Result<Vec<Dish>, OverlayError> {
        self.reader().await.filter_dishes(dishes, axes).await
    }

    /// Keeps the visible combos, preserving order.
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn filter_combos(&self, combos: Vec<Combo>) -> Result<Vec<Combo>, OverlayError> {
        self.reader().await.filter_combos(combos).await
    }

    /// Sets one entity's bit on a global axis. Returns the previous bit.
    ///
    /// # Errors
    ///
    /// See [`StatusWriter::set_status`].
    pub async fn set_status(
        &self,
        axis: StatusAxis,
        id: EntityId,
        on: bool,
    ) -> Result<bool, OverlayError> {
        self.writer().await.set_status(axis, id, on).await
    }

    /// Applies many bit changes to one global axis.
    ///
    /// # Errors
    ///
    /// See [`StatusWriter::bulk_update`].
    pub async fn bulk_update(
        &self,
        axis: StatusAxis,
        changes: &[(EntityId, bool)],
    ) -> Result<(), OverlayError> {
        self.writer().await.bulk_update(axis, changes).await
    }

    /// Checks `ids` against the catalog and makes sure the axis bitmap
    /// exists. A missing bitmap is seeded with every known entity visible,
    /// so the first write to an axis only changes the bits it names.
    async fn prepare_axis(
        &self,
        axis: StatusAxis,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Result<String, OverlayError> {
        if axis.is_user_scoped() {
            return Err(OverlayError::UserScopedAxis(axis));
        }
        let universe: HashSet<EntityId> = self
            .store
            .entity_ids()
            .await
            .map_err(OverlayError::Store)?
            .into_iter()
            .collect();
        if let Some(unknown) = ids.into_iter().find(|id| !universe.contains(id)) {
            return Err(OverlayError::UnknownEntity(unknown));
        }

        let key = keys::status(axis);
        if !self.cache.exists(&key).await? {
            let len_bits = universe.iter().max().map_or(0, |max| max + 1);
            let seed = Bitmap::from_offsets(universe.iter().copied(), len_bits);
            if self.cache.put_bitmap_if_absent(&key, &seed, None).await? {
                info!(%axis, entities = universe.len(), "status bitmap seeded");
            }
        }
        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Per-user favorites
    // -----------------------------------------------------------------------

    /// Whether `user_id` has favorited `id`, via the self-healing read.
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::favorited_among`].
    pub async fn has_favorited(&self, user_id: &str, id: EntityId) -> Result<bool, OverlayError> {
        Ok(!self.favorited_among(user_id, &[id]).await?.is_empty())
    }

    /// The subset of `ids` the user has favorited, in the order given.
    ///
    /// If the user's bitmap is missing or unreadable it is rebuilt from the
    /// store and the read is retried exactly once.
    ///
    /// # Errors
    ///
    /// - [`OverlayError::CacheUnavailable`] if the retry also fails, or the
    ///   rebuilt bitmap cannot be written
    /// - [`OverlayError::Store`] if the store cannot supply the rebuild data
    pub async fn favorited_among(
        &self,
        user_id: &str,
        ids: &[EntityId],
    ) -> Result<Vec<EntityId>, OverlayError> {
        let key = keys::user_status(user_id, StatusAxis::Favorite);
        match self.read_bits(&key, ids).await {
            Ok(Some(hits)) => return Ok(hits),
            Ok(None) => debug!(%key, "favorite bitmap missing, rebuilding"),
            Err(e) => warn!(%key, error = %e, "favorite bitmap unreadable, rebuilding"),
        }

        self.rebuild_favorites(user_id, &key).await?;

        match self.read_bits(&key, ids).await {
            Ok(Some(hits)) => Ok(hits),
            Ok(None) => Err(OverlayError::CacheUnavailable {
                source: CacheError::Unavailable("bitmap vanished after rebuild".to_string()),
                key,
            }),
            Err(source) => Err(OverlayError::CacheUnavailable { key, source }),
        }
    }

    /// Mirrors a persisted favorite change into the user's bitmap.
    ///
    /// Only an existing bitmap is touched; a missing one is left for the next
    /// read to rebuild from the store. An unreadable one is dropped for the
    /// same reason.
    ///
    /// # Errors
    ///
    /// Returns the cache failure when the backend itself is unavailable.
    pub async fn set_favorite(
        &self,
        user_id: &str,
        id: EntityId,
        on: bool,
    ) -> Result<(), OverlayError> {
        let key = keys::user_status(user_id, StatusAxis::Favorite);
        match self.cache.set_bit_if_present(&key, id, on).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                debug!(%key, "no favorite bitmap cached, deferring to next read");
                Ok(())
            }
            Err(e) if e.is_entry_fault() => {
                warn!(%key, error = %e, "dropping unreadable favorite bitmap");
                self.cache.delete(&key).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the bits for `ids`. `None` if the bitmap does not exist.
    async fn read_bits(
        &self,
        key: &str,
        ids: &[EntityId],
    ) -> Result<Option<Vec<EntityId>>, CacheError> {
        let mut hits = Vec::new();
        for &id in ids {
            match self.cache.get_bit(key, id).await? {
                None => return Ok(None),
                Some(true) => hits.push(id),
                Some(false) => {}
            }
        }
        Ok(Some(hits))
    }

    async fn rebuild_favorites(&self, user_id: &str, key: &str) -> Result<(), OverlayError> {
        let universe = self
            .store
            .entity_ids()
            .await
            .map_err(OverlayError::Store)?;
        let favorites = self
            .store
            .favorite_ids(user_id)
            .await
            .map_err(OverlayError::Store)?;

        let len_bits = universe.iter().max().map_or(0, |max| max + 1);
        let bitmap = Bitmap::from_offsets(
            favorites.into_iter().filter(|id| universe.contains(id)),
            len_bits,
        );

        self.cache
            .put_bitmap(key, &bitmap, self.favorite_ttl)
            .await
            .map_err(|source| OverlayError::CacheUnavailable {
                key: key.to_string(),
                source,
            })?;

        metrics::counter!("canteen_overlay_rebuilds_total").increment(1);
        info!(user_id, favorites = bitmap.count_ones(), "favorite bitmap rebuilt");
        Ok(())
    }
}

/// Composite visibility reads sharing one hold of the read side of the
/// guard. Obtained from [`StatusOverlay::reader`].
pub struct StatusReader<'a> {
    overlay: &'a StatusOverlay,
    _guard: RwLockReadGuard<'a, ()>,
}

impl StatusReader<'_> {
    /// See [`StatusOverlay::filter_dishes`].
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn filter_dishes(
        &self,
        dishes: Vec<Dish>,
        axes: &[StatusAxis],
    ) -> Result<Vec<Dish>, OverlayError> {
        let mut visible = Vec::with_capacity(dishes.len());
        for dish in dishes {
            if self.overlay.is_visible_on_all(axes, dish.id).await? {
                visible.push(dish);
            }
        }
        Ok(visible)
    }

    /// See [`StatusOverlay::filter_combos`].
    ///
    /// # Errors
    ///
    /// See [`StatusOverlay::is_visible`].
    pub async fn filter_combos(&self, combos: Vec<Combo>) -> Result<Vec<Combo>, OverlayError> {
        let mut visible = Vec::with_capacity(combos.len());
        for combo in combos {
            if self.overlay.is_combo_visible(&combo).await? {
                visible.push(combo);
            }
        }
        Ok(visible)
    }
}

/// Status writes sharing one hold of the write side of the guard. Obtained
/// from [`StatusOverlay::writer`].
pub struct StatusWriter<'a> {
    overlay: &'a StatusOverlay,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl StatusWriter<'_> {
    /// Sets one entity's bit on a global axis. Returns the previous bit.
    ///
    /// # Errors
    ///
    /// - [`OverlayError::UserScopedAxis`] for per-user axes
    /// - [`OverlayError::UnknownEntity`] if `id` is not in the catalog
    /// - the cache failure if the write does not go through
    pub async fn set_status(
        &self,
        axis: StatusAxis,
        id: EntityId,
        on: bool,
    ) -> Result<bool, OverlayError> {
        let key = self.overlay.prepare_axis(axis, [id]).await?;
        Ok(self.overlay.cache.set_bit(&key, id, on).await?)
    }

    /// Applies many bit changes to one axis. Readers holding a
    /// [`StatusReader`] see all of them or none.
    ///
    /// # Errors
    ///
    /// See [`StatusWriter::set_status`]. Unknown ids are refused before
    /// anything is written. Changes before a failing cache write stay
    /// applied.
    pub async fn bulk_update(
        &self,
        axis: StatusAxis,
        changes: &[(EntityId, bool)],
    ) -> Result<(), OverlayError> {
        let key = self
            .overlay
            .prepare_axis(axis, changes.iter().map(|&(id, _)| id))
            .await?;
        for &(id, on) in changes {
            self.overlay.cache.set_bit(&key, id, on).await?;
        }
        info!(%axis, count = changes.len(), "bulk status update applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use canteen_core::ComboDish;

    use super::*;
    use crate::storage::datastores::{CatalogSeed, MemoryCatalog};
    use crate::storage::engines::HashMapCache;
    use crate::storage::testing::FlakyCache;
    use crate::storage::CacheValue;

    fn dish(id: EntityId) -> Dish {
        Dish {
            id,
            name: format!("dish-{id}"),
            price: 1.0,
            image: format!("{id}.png"),
            sale: 0,
            like_count: 0,
            store_id: 1,
            tags: vec![],
            is_new: false,
            is_recommended: false,
        }
    }

    fn combo(id: EntityId, parts: &[EntityId]) -> Combo {
        Combo {
            id,
            name: format!("combo-{id}"),
            price: 5.0,
            sale: 0,
            tags: vec![],
            dishes: parts
                .iter()
                .map(|&dish_id| ComboDish {
                    dish_id,
                    quantity: 1,
                    image: String::new(),
                })
                .collect(),
        }
    }

    fn catalog() -> Arc<MemoryCatalog> {
        Arc::new(MemoryCatalog::from_seed(CatalogSeed {
            dishes: vec![dish(1), dish(2), dish(3)],
            combos: vec![combo(100_001, &[1, 2]), combo(100_002, &[3])],
            ..CatalogSeed::default()
        }))
    }

    fn overlay(cache: Arc<dyn CacheEngine>, store: Arc<MemoryCatalog>) -> StatusOverlay {
        StatusOverlay::new(cache, store, Arc::new(StatusGuard::new()), None)
    }

    #[tokio::test]
    async fn absent_bitmap_means_visible() {
        let overlay = overlay(Arc::new(HashMapCache::new()), catalog());
        for axis in StatusAxis::GLOBAL {
            assert!(overlay.is_visible(axis, 1).await.unwrap());
        }
    }

    #[tokio::test]
    async fn first_write_to_an_axis_only_changes_that_bit() {
        let overlay = overlay(Arc::new(HashMapCache::new()), catalog());
        assert!(!overlay.set_status(StatusAxis::Publish, 2, false).await.unwrap());

        assert!(!overlay.is_visible(StatusAxis::Publish, 2).await.unwrap());
        for id in [1, 3, 100_001, 100_002] {
            assert!(overlay.is_visible(StatusAxis::Publish, id).await.unwrap());
        }
        // Turning it back on restores the absent-bitmap view.
        assert!(!overlay.set_status(StatusAxis::Publish, 2, true).await.unwrap());
        assert!(overlay.is_visible(StatusAxis::Publish, 2).await.unwrap());
    }

    #[tokio::test]
    async fn seeding_does_not_overwrite_an_existing_bitmap() {
        let cache = Arc::new(HashMapCache::new());
        let overlay = overlay(cache.clone(), catalog());
        overlay.set_status(StatusAxis::New, 1, false).await.unwrap();
        overlay.set_status(StatusAxis::New, 3, false).await.unwrap();

        assert!(!overlay.is_visible(StatusAxis::New, 1).await.unwrap());
        assert!(overlay.is_visible(StatusAxis::New, 2).await.unwrap());
        assert!(!overlay.is_visible(StatusAxis::New, 3).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_entity_is_refused_before_any_write() {
        let cache = Arc::new(HashMapCache::new());
        let overlay = overlay(cache.clone(), catalog());

        let err = overlay
            .bulk_update(StatusAxis::Publish, &[(1, false), (u32::MAX, true)])
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::UnknownEntity(u32::MAX)));
        assert!(!cache.exists(&keys::status(StatusAxis::Publish)).await.unwrap());
        assert!(overlay.is_visible(StatusAxis::Publish, 1).await.unwrap());
    }

    #[tokio::test]
    async fn multi_axis_filter_is_conjunction() {
        let overlay = overlay(Arc::new(HashMapCache::new()), catalog());
        overlay.set_status(StatusAxis::New, 3, false).await.unwrap();
        overlay.set_status(StatusAxis::Publish, 2, false).await.unwrap();

        let dishes = vec![dish(1), dish(2), dish(3)];
        let visible = overlay
            .filter_dishes(dishes, &[StatusAxis::Publish, StatusAxis::New])
            .await
            .unwrap();
        let ids: Vec<_> = visible.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn writer_waits_for_an_open_reader() {
        let overlay = Arc::new(overlay(Arc::new(HashMapCache::new()), catalog()));
        let reader = overlay.reader().await;

        let write = {
            let overlay = overlay.clone();
            tokio::spawn(async move {
                overlay
                    .bulk_update(StatusAxis::Publish, &[(1, false)])
                    .await
                    .unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = reader.filter_dishes(vec![dish(1)], &[StatusAxis::Publish]).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!write.is_finished());

        drop(reader);
        tokio::time::timeout(Duration::from_secs(1), write)
            .await
            .unwrap()
            .unwrap();
        assert!(!overlay.is_visible(StatusAxis::Publish, 1).await.unwrap());
    }

    #[tokio::test]
    async fn user_scoped_axis_is_refused_for_global_ops() {
        let overlay = overlay(Arc::new(HashMapCache::new()), catalog());
        assert!(matches!(
            overlay.is_visible(StatusAxis::Favorite, 1).await,
            Err(OverlayError::UserScopedAxis(_))
        ));
        assert!(overlay
            .bulk_update(StatusAxis::Favorite, &[(1, true)])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn combo_needs_every_dish_and_its_own_flag() {
        let overlay = overlay(Arc::new(HashMapCache::new()), catalog());
        let combos = vec![combo(100_001, &[1, 2]), combo(100_002, &[3])];

        // No bitmaps yet: everything visible.
        assert_eq!(overlay.filter_combos(combos.clone()).await.unwrap().len(), 2);

        // Unpublishing dish 2 hides combo 100001 only.
        overlay
            .bulk_update(StatusAxis::Publish, &[(1, true), (2, false), (3, true)])
            .await
            .unwrap();
        let ids: Vec<_> = overlay
            .filter_combos(combos.clone())
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![100_002]);

        // Combo axis is checked after the dishes.
        overlay
            .set_status(StatusAxis::ComboPublish, 100_002, false)
            .await
            .unwrap();
        assert!(overlay.filter_combos(combos).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_favorite_bitmap_is_rebuilt_from_store() {
        let store = catalog();
        store.set_favorite("u", 2, true).await.unwrap();
        store.set_favorite("u", 100_002, true).await.unwrap();
        let cache = Arc::new(HashMapCache::new());
        let overlay = overlay(cache.clone(), store.clone());

        let hits = overlay
            .favorited_among("u", &[1, 2, 3, 100_001, 100_002])
            .await
            .unwrap();
        assert_eq!(hits, vec![2, 100_002]);
        assert_eq!(store.favorite_reads(), 1);

        // Second read is served from the rebuilt bitmap.
        assert!(overlay.has_favorited("u", 2).await.unwrap());
        assert_eq!(store.favorite_reads(), 1);
    }

    #[tokio::test]
    async fn corrupt_favorite_bitmap_is_replaced() {
        let store = catalog();
        store.set_favorite("u", 1, true).await.unwrap();
        let cache = Arc::new(HashMapCache::new());
        cache.insert_value(
            &keys::user_status("u", StatusAxis::Favorite),
            CacheValue::Text("garbage".to_string()),
            None,
        );
        let overlay = overlay(cache, store.clone());

        assert!(overlay.has_favorited("u", 1).await.unwrap());
        assert_eq!(store.favorite_reads(), 1);
    }

    #[tokio::test]
    async fn second_failure_surfaces_without_another_rebuild() {
        let store = catalog();
        let cache = Arc::new(FlakyCache::default());
        cache.fail_bit_reads.store(true, Ordering::SeqCst);
        let overlay = overlay(cache.clone(), store.clone());

        let err = overlay.favorited_among("u", &[1]).await.unwrap_err();
        assert!(matches!(err, OverlayError::CacheUnavailable { .. }));
        assert_eq!(cache.bitmap_writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.favorite_reads(), 1);
    }

    #[tokio::test]
    async fn failed_rebuild_write_is_cache_unavailable() {
        let store = catalog();
        let cache = Arc::new(FlakyCache::default());
        cache.fail_bitmap_writes.store(true, Ordering::SeqCst);
        let overlay = overlay(cache, store);

        assert!(matches!(
            overlay.favorited_among("u", &[1]).await,
            Err(OverlayError::CacheUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn set_favorite_updates_only_existing_bitmaps() {
        let store = catalog();
        let cache = Arc::new(HashMapCache::new());
        let overlay = overlay(cache.clone(), store.clone());
        let key = keys::user_status("u", StatusAxis::Favorite);

        overlay.set_favorite("u", 1, true).await.unwrap();
        assert!(!cache.exists(&key).await.unwrap());

        // Materialize, then mirror a change.
        assert!(!overlay.has_favorited("u", 1).await.unwrap());
        overlay.set_favorite("u", 1, true).await.unwrap();
        assert!(overlay.has_favorited("u", 1).await.unwrap());
        assert_eq!(store.favorite_reads(), 1);
    }

    #[tokio::test]
    async fn set_favorite_drops_corrupt_bitmap() {
        let cache = Arc::new(HashMapCache::new());
        let key = keys::user_status("u", StatusAxis::Favorite);
        cache.insert_value(&key, CacheValue::Int(7), None);
        let overlay = overlay(cache.clone(), catalog());

        overlay.set_favorite("u", 1, true).await.unwrap();
        assert!(!cache.exists(&key).await.unwrap());
    }
}

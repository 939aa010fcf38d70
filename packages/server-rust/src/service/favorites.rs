//! Per-user favorites.

use std::sync::Arc;

use canteen_core::{EntityId, UserId};
use tracing::{debug, warn};

use super::catalog::DishSummary;
use crate::notify::{CounterNotifier, TriggerEvent};
use crate::overlay::{OverlayError, StatusOverlay};
use crate::traits::CatalogStore;

#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    #[error("entity {0} does not exist")]
    NotFound(EntityId),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
}

/// Persists favorites, mirrors them into the per-user bitmap and emits the
/// counter events.
pub struct FavoritesService {
    store: Arc<dyn CatalogStore>,
    overlay: Arc<StatusOverlay>,
    notifier: Arc<CounterNotifier>,
}

impl FavoritesService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        overlay: Arc<StatusOverlay>,
        notifier: Arc<CounterNotifier>,
    ) -> Self {
        Self {
            store,
            overlay,
            notifier,
        }
    }

    /// Favorites or unfavorites an entity. Returns `true` if the stored
    /// state changed; events fire only then, so repeated toggles do not
    /// drift the like counters.
    ///
    /// # Errors
    ///
    /// [`FavoritesError::NotFound`] for an unknown entity, otherwise the
    /// store or cache failure.
    pub async fn toggle(
        &self,
        user_id: &str,
        entity_id: EntityId,
        on: bool,
    ) -> Result<bool, FavoritesError> {
        let known = self
            .store
            .entity_ids()
            .await
            .map_err(FavoritesError::Store)?;
        if !known.contains(&entity_id) {
            return Err(FavoritesError::NotFound(entity_id));
        }

        let changed = self
            .store
            .set_favorite(user_id, entity_id, on)
            .await
            .map_err(FavoritesError::Store)?;
        self.overlay.set_favorite(user_id, entity_id, on).await?;
        if !changed {
            debug!(user_id, entity_id, on, "favorite unchanged");
            return Ok(false);
        }

        let user_id: UserId = user_id.to_string();
        let event = if on {
            TriggerEvent::DishFavorited { user_id, entity_id }
        } else {
            TriggerEvent::DishUnfavorited { user_id, entity_id }
        };
        let report = self.notifier.fire("favorites", &event).await;
        if !report.is_clean() {
            warn!(entity_id, failures = report.failures.len(), "favorite observers failed");
        }
        Ok(true)
    }

    /// The user's favorited dishes followed by their favorited combos.
    ///
    /// # Errors
    ///
    /// Returns the store failure, or [`OverlayError::CacheUnavailable`] when
    /// the favorite bitmap cannot be read even after a rebuild.
    pub async fn list(&self, user_id: &str) -> Result<Vec<DishSummary>, FavoritesError> {
        let dishes = self.store.dishes().await.map_err(FavoritesError::Store)?;
        let combos = self.store.combos().await.map_err(FavoritesError::Store)?;

        let candidates: Vec<EntityId> = dishes
            .iter()
            .map(|d| d.id)
            .chain(combos.iter().map(|c| c.id))
            .collect();
        let hits = self.overlay.favorited_among(user_id, &candidates).await?;

        let mut list: Vec<DishSummary> = dishes
            .iter()
            .filter(|d| hits.contains(&d.id))
            .map(DishSummary::from)
            .collect();
        list.extend(
            combos
                .iter()
                .filter(|c| hits.contains(&c.id))
                .map(DishSummary::from),
        );
        Ok(list)
    }
}

//! Visibility-filtered catalog pages.

use std::sync::Arc;
use std::time::Duration;

use canteen_core::{keys, Combo, Dish, EntityId, StatusAxis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::CatalogConfig;
use crate::overlay::{OverlayError, StatusOverlay, StatusReader};
use crate::storage::{CacheEngine, CacheError};
use crate::traits::CatalogStore;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
    #[error("index page could not be encoded")]
    Encode(#[from] serde_json::Error),
}

/// A dish or combo as shown in lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DishSummary {
    pub id: EntityId,
    pub name: String,
    pub price: f64,
    pub image: String,
    pub sale: u64,
    pub tags: Vec<String>,
}

impl From<&Dish> for DishSummary {
    fn from(dish: &Dish) -> Self {
        Self {
            id: dish.id,
            name: dish.name.clone(),
            price: dish.price,
            image: dish.image.clone(),
            sale: dish.sale,
            tags: dish.tags.clone(),
        }
    }
}

impl From<&Combo> for DishSummary {
    fn from(combo: &Combo) -> Self {
        Self {
            id: combo.id,
            name: combo.name.clone(),
            price: combo.price,
            image: combo.cover_image().to_string(),
            sale: combo.sale,
            tags: combo.tags.clone(),
        }
    }
}

/// The landing page: three dish lists and the published combos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPage {
    pub hot: Vec<DishSummary>,
    pub new: Vec<DishSummary>,
    pub recommended: Vec<DishSummary>,
    pub combos: Vec<DishSummary>,
}

/// Builds catalog pages from the store filtered through the status overlay.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    overlay: Arc<StatusOverlay>,
    cache: Arc<dyn CacheEngine>,
    index_ttl: Duration,
    hot_limit: usize,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        overlay: Arc<StatusOverlay>,
        cache: Arc<dyn CacheEngine>,
        config: &CatalogConfig,
    ) -> Self {
        Self {
            store,
            overlay,
            cache,
            index_ttl: config.index_ttl,
            hot_limit: config.hot_limit,
        }
    }

    /// The index page, served from the page cache when present.
    ///
    /// A cached page that no longer decodes is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the status bitmaps cannot be read.
    /// Failing to write the page cache is logged, not returned.
    pub async fn index(&self) -> Result<IndexPage, CatalogError> {
        match self.cache.get_text(keys::CATALOG_INDEX).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(page) => return Ok(page),
                Err(e) => warn!(error = %e, "cached index page unreadable, rebuilding"),
            },
            Ok(None) => debug!("index page cache miss"),
            Err(e) if e.is_entry_fault() => {
                warn!(error = %e, "cached index page unreadable, rebuilding");
            }
            Err(e) => return Err(e.into()),
        }

        // The page is built and cached under one read hold, so an admin
        // update cannot drop the key between the two.
        let reader = self.overlay.reader().await;
        let page = self.build_index(&reader).await?;
        let raw = serde_json::to_string(&page)?;
        if let Err(e) = self
            .cache
            .set_text(keys::CATALOG_INDEX, &raw, Some(self.index_ttl))
            .await
        {
            warn!(error = %e, "index page not cached");
        }
        Ok(page)
    }

    async fn build_index(&self, reader: &StatusReader<'_>) -> Result<IndexPage, CatalogError> {
        let dishes = self.store.dishes().await.map_err(CatalogError::Store)?;
        let combos = self.store.combos().await.map_err(CatalogError::Store)?;

        let mut hot = dishes.clone();
        hot.sort_by(|a, b| b.sale.cmp(&a.sale).then(a.id.cmp(&b.id)));
        let mut hot = reader.filter_dishes(hot, &[StatusAxis::Publish]).await?;
        hot.truncate(self.hot_limit);

        let new = reader
            .filter_dishes(
                dishes.iter().filter(|d| d.is_new).cloned().collect(),
                &[StatusAxis::Publish, StatusAxis::New],
            )
            .await?;
        let recommended = reader
            .filter_dishes(
                dishes.into_iter().filter(|d| d.is_recommended).collect(),
                &[StatusAxis::Publish, StatusAxis::Recommend],
            )
            .await?;
        let combos = reader.filter_combos(combos).await?;

        Ok(IndexPage {
            hot: hot.iter().map(DishSummary::from).collect(),
            new: new.iter().map(DishSummary::from).collect(),
            recommended: recommended.iter().map(DishSummary::from).collect(),
            combos: combos.iter().map(DishSummary::from).collect(),
        })
    }

    /// Published dishes of one store front, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the publish bitmap cannot be read.
    pub async fn order_menu(&self, store_id: u32) -> Result<Vec<DishSummary>, CatalogError> {
        let dishes = self
            .store
            .dishes_by_store(store_id)
            .await
            .map_err(CatalogError::Store)?;
        let visible = self
            .overlay
            .filter_dishes(dishes, &[StatusAxis::Publish])
            .await?;
        Ok(visible.iter().map(DishSummary::from).collect())
    }

    /// Applies a bulk status change and drops the cached index page.
    ///
    /// # Errors
    ///
    /// Returns an error for per-user axes, ids outside the catalog or a
    /// failed bitmap write.
    pub async fn update_status(
        &self,
        axis: StatusAxis,
        changes: &[(EntityId, bool)],
    ) -> Result<(), CatalogError> {
        let writer = self.overlay.writer().await;
        writer.bulk_update(axis, changes).await?;
        self.cache.delete(keys::CATALOG_INDEX).await?;
        drop(writer);
        info!(%axis, count = changes.len(), "catalog status updated");
        Ok(())
    }
}

//! Catalog pages.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::network::error::ApiError;
use crate::service::{DishSummary, IndexPage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMenuParams {
    pub store_id: u32,
}

/// `GET /catalog/index`
pub async fn index_handler(State(state): State<AppState>) -> Result<Json<IndexPage>, ApiError> {
    Ok(Json(state.catalog.index().await?))
}

/// `GET /catalog/order?storeId=`: the published dishes of one store front.
pub async fn order_menu_handler(
    State(state): State<AppState>,
    Query(params): Query<OrderMenuParams>,
) -> Result<Json<Vec<DishSummary>>, ApiError> {
    Ok(Json(state.catalog.order_menu(params.store_id).await?))
}

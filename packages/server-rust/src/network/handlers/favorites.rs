//! Favorites of the calling user.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use canteen_core::EntityId;
use serde_json::{json, Value};

use super::AppState;
use crate::network::error::ApiError;
use crate::network::interceptor::CurrentUser;
use crate::service::DishSummary;

/// `GET /favorites`
pub async fn list_favorites_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<Vec<DishSummary>>, ApiError> {
    Ok(Json(state.favorites.list(&user_id).await?))
}

/// `PUT /favorites/{entityId}`
pub async fn add_favorite_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(entity_id): Path<EntityId>,
) -> Result<Json<Value>, ApiError> {
    let changed = state.favorites.toggle(&user_id, entity_id, true).await?;
    Ok(Json(json!({ "entityId": entity_id, "favorited": true, "changed": changed })))
}

/// `DELETE /favorites/{entityId}`
pub async fn remove_favorite_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(entity_id): Path<EntityId>,
) -> Result<Json<Value>, ApiError> {
    let changed = state.favorites.toggle(&user_id, entity_id, false).await?;
    Ok(Json(json!({ "entityId": entity_id, "favorited": false, "changed": changed })))
}

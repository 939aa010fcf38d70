//! Administrative status updates.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use canteen_core::{EntityId, StatusAxis};
use serde::Deserialize;

use super::AppState;
use crate::network::error::ApiError;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub entity_id: EntityId,
    pub on: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub changes: Vec<StatusChange>,
}

/// `PUT /admin/status/{axis}`: applies every change under the status write
/// lock and invalidates the cached index page.
pub async fn update_status_handler(
    State(state): State<AppState>,
    Path(axis): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let axis: StatusAxis = axis
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let changes: Vec<(EntityId, bool)> = body
        .changes
        .iter()
        .map(|c| (c.entity_id, c.on))
        .collect();
    state.catalog.update_status(axis, &changes).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Login and logout.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{Map, Value};

use super::AppState;
use crate::network::error::ApiError;
use crate::network::interceptor::{header_token, TOKEN_HEADER};

/// `POST /login`: the `token` header carries the upstream login code.
///
/// Returns the provider's fields plus the new session `token`.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let code = header_token(&headers).unwrap_or_default();
    Ok(Json(state.login.login(code).await?))
}

/// `POST /logout`: ends the caller's session.
///
/// Runs behind the session interceptor, so the `token` header is present
/// and live.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = header_token(&headers)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {TOKEN_HEADER} header")))?;
    state.login.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

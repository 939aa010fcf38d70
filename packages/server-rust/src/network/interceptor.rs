//! Per-route request interceptors.
//!
//! [`require_session`] resolves the caller from the `token` header;
//! [`authorize_request`] then runs the authorization chain over the query
//! parameters. Both short-circuit with an [`ApiError`].

use std::collections::BTreeMap;

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use canteen_core::{RequestContext, UserId};
use tracing::debug;

use super::error::ApiError;
use super::handlers::AppState;
use crate::auth::AuthError;

/// Header carrying the session token (and, on `/login`, the login code).
pub const TOKEN_HEADER: &str = "token";

/// The authenticated caller, inserted into request extensions by
/// [`require_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Reads the `token` header, if present and valid UTF-8.
#[must_use]
pub fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

fn count_rejection(stage: &'static str, error: &AuthError) {
    if error.is_denial() {
        metrics::counter!(
            "canteen_auth_rejections_total",
            "stage" => stage,
            "reason" => error.reason()
        )
        .increment(1);
    }
}

/// Session interceptor: 401 unless the `token` header names a live session.
///
/// # Errors
///
/// Returns [`ApiError::Auth`] when the token is missing, invalid or expired,
/// or when the session cache cannot be read.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = header_token(request.headers()).map(str::to_owned);
    let user_id = state
        .authenticator
        .authenticate(token.as_deref())
        .await
        .inspect_err(|e| count_rejection("session", e))?;

    request.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(request).await)
}

/// Authorization interceptor: runs every applicable filter in order.
///
/// # Errors
///
/// Returns [`ApiError::Auth`] naming the first filter that refused, or the
/// check failure of a filter that could not decide.
pub async fn authorize_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = request_context(&request);
    state
        .chain
        .authorize(&context)
        .await
        .inspect_err(|e| count_rejection("chain", e))?;
    debug!(path = %context.path, "request authorized");
    Ok(next.run(request).await)
}

fn request_context(request: &Request) -> RequestContext {
    let params = Query::<BTreeMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default();
    RequestContext {
        path: request.uri().path().to_string(),
        params,
        user_id: request
            .extensions()
            .get::<CurrentUser>()
            .map(|CurrentUser(id)| id.clone()),
        request_id: request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    }
}

//! Mapping of service errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::auth::AuthError;
use crate::overlay::OverlayError;
use crate::service::{CatalogError, FavoritesError, LoginError, OrderError};
use crate::storage::CacheError;

/// Every error a handler or interceptor can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Favorites(#[from] FavoritesError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) if e.is_denial() => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) | ApiError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Login(e) => match e {
                LoginError::MissingCode => StatusCode::BAD_REQUEST,
                LoginError::UpstreamIdentity(_) => StatusCode::UNAUTHORIZED,
                LoginError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
                LoginError::Token(_) | LoginError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Catalog(e) => match e {
                CatalogError::Overlay(e) => overlay_status(e),
                CatalogError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
                CatalogError::Store(_) | CatalogError::Encode(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Favorites(e) => match e {
                FavoritesError::NotFound(_) => StatusCode::NOT_FOUND,
                FavoritesError::Overlay(e) => overlay_status(e),
                FavoritesError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Order(e) => match e {
                OrderError::EmptyOrder | OrderError::Expand(_) => StatusCode::BAD_REQUEST,
                OrderError::Queue(_) | OrderError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
                OrderError::Encode(_) | OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn overlay_status(error: &OverlayError) -> StatusCode {
    match error {
        OverlayError::CacheUnavailable { .. } | OverlayError::Cache(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OverlayError::UserScopedAxis(_) => StatusCode::BAD_REQUEST,
        OverlayError::UnknownEntity(_) => StatusCode::NOT_FOUND,
        OverlayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let source = std::error::Error::source(&self).map(ToString::to_string);
            if status == StatusCode::SERVICE_UNAVAILABLE {
                warn!(status = status.as_u16(), error = %self, source = source.as_deref(), "request failed");
            } else {
                error!(status = status.as_u16(), error = %self, source = source.as_deref(), "request failed");
            }
        } else {
            debug!(status = status.as_u16(), error = %self, "request refused");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

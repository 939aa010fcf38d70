//! Health, liveness, and readiness endpoint handlers.
//!
//! These handlers expose server health information for orchestrators
//! (Kubernetes, load balancers) and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the server is actually healthy, and `cache` whether the cache
/// backend answered a ping.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    let cache = if state.cache.ping().await.is_ok() {
        "ok"
    } else {
        "unavailable"
    };

    Json(json!({
        "state": health.as_str(),
        "cache": cache,
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Kubernetes liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe -- 200 when ready and the cache answers, 503
/// otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() != HealthState::Ready {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.cache.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "readiness: cache ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::app::testing::state_with_cache;
    use crate::storage::testing::FlakyCache;

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = state_with_cache(Arc::new(FlakyCache::default()));
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["cache"], "ok");
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_starting_and_draining() {
        let state = state_with_cache(Arc::new(FlakyCache::default()));
        assert_eq!(health_handler(State(state.clone())).await.0["state"], "starting");

        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();
        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_requires_ready_state() {
        let state = state_with_cache(Arc::new(FlakyCache::default()));
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_fails_when_cache_is_down() {
        let cache = Arc::new(FlakyCache::default());
        let state = state_with_cache(cache.clone());
        state.shutdown.set_ready();
        cache.unavailable.store(true, Ordering::SeqCst);

        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(health_handler(State(state)).await.0["cache"], "unavailable");
    }
}

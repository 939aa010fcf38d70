//! Network module with deferred startup lifecycle.
//!
//! `new()` takes the assembled application state, `start()` binds the TCP
//! listener, and `serve()` accepts connections until shutdown. Binding
//! before serving lets the binary report the OS-assigned port first.

use std::future::Future;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    add_favorite_handler, health_handler, index_handler, list_favorites_handler,
    liveness_handler, login_handler, logout_handler, order_menu_handler, order_status_handler,
    place_order_handler, readiness_handler, remove_favorite_handler, update_status_handler,
    AppState,
};
use super::interceptor::{authorize_request, require_session};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// Assembles the axum router.
///
/// Public routes:
/// - `GET /health`, `/health/live`, `/health/ready`
/// - `POST /login`
///
/// Every other route runs the session interceptor, then the authorization
/// chain, then the handler.
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    // route_layer: the last layer added runs first.
    let protected = Router::new()
        .route("/logout", post(logout_handler))
        .route("/catalog/index", get(index_handler))
        .route("/catalog/order", get(order_menu_handler))
        .route("/favorites", get(list_favorites_handler))
        .route(
            "/favorites/{entity_id}",
            put(add_favorite_handler).delete(remove_favorite_handler),
        )
        .route("/orders", post(place_order_handler))
        .route("/orders/status", get(order_status_handler))
        .route("/admin/status/{axis}", put(update_status_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authorize_request,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/login", post(login_handler))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), track_in_flight))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState) -> Self {
        Self {
            config,
            listener: None,
            state,
        }
    }

    /// Shared shutdown controller, for signal handlers and workers.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    pub fn build_router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Binds the TCP listener and returns the bound port, which differs from
    /// the configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests for
    /// up to `drain_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = build_router(self.state.clone(), &self.config);
        let shutdown_ctrl = Arc::clone(&self.state.shutdown);

        shutdown_ctrl.set_ready();
        info!("serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        shutdown_ctrl.trigger_shutdown();
        if shutdown_ctrl.wait_for_drain(self.config.drain_timeout).await {
            info!("all requests drained");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "drain timeout expired with requests remaining"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::state_with_cache;
    use crate::network::HealthState;
    use crate::storage::engines::HashMapCache;

    fn module() -> NetworkModule {
        NetworkModule::new(
            NetworkConfig {
                host: "127.0.0.1".to_string(),
                ..NetworkConfig::default()
            },
            state_with_cache(Arc::new(HashMapCache::new())),
        )
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module()
            .serve(std::future::ready(()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serves_until_shutdown_then_stops() {
        let mut module = module();
        let port = module.start().await.unwrap();
        let ctrl = module.shutdown_controller();

        let server = {
            let ctrl = Arc::clone(&ctrl);
            tokio::spawn(module.serve(async move { ctrl.wait_for_shutdown().await }))
        };

        let url = format!("http://127.0.0.1:{port}/health/live");
        let mut status = None;
        for _ in 0..50 {
            if let Ok(response) = reqwest::get(&url).await {
                status = Some(response.status());
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(reqwest::StatusCode::OK));
        assert_eq!(ctrl.health_state(), HealthState::Ready);

        ctrl.trigger_shutdown();
        server.await.unwrap().unwrap();
        assert_eq!(ctrl.health_state(), HealthState::Stopped);
    }
}

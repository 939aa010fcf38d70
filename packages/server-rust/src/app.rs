//! Composition root: wires the cache, the store and the identity provider
//! into services, starts the background workers, and hands the HTTP layer
//! its [`AppState`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use canteen_core::ClockSource;
use tracing::info;

use crate::auth::{
    AuthorizationChain, OrderOwnershipFilter, RequestFilter, SessionAuthenticator, SessionStore,
    TokenCodec, UserIdFilter,
};
use crate::network::{AppState, ShutdownController};
use crate::notify::{
    CounterFlusher, CounterLedger, CounterNotifier, FavoriteCountObserver, FlushRequest,
    SalesCountObserver,
};
use crate::orders::{InProcessQueue, OrderCompletionTracker, OrderConsumer};
use crate::overlay::{StatusGuard, StatusOverlay};
use crate::service::{
    AppConfig, BackgroundWorker, CatalogService, FavoritesService, IdentityProvider, LoginService,
    OrderService,
};
use crate::storage::CacheEngine;
use crate::traits::CatalogStore;

/// The order consumer has no periodic work; its tick only needs to be rare.
const CONSUMER_TICK: Duration = Duration::from_secs(3600);

/// Running application: shared state plus the workers that must be stopped.
pub struct Canteen {
    state: AppState,
    notifier: Arc<CounterNotifier>,
    order_queue: Arc<InProcessQueue>,
    flusher: BackgroundWorker<CounterFlusher>,
}

impl Canteen {
    /// Builds every service and starts the order consumer and the counter
    /// flusher. Must be called inside a Tokio runtime.
    ///
    /// Observers are registered favorites first (priority 0), then sales
    /// (priority 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is empty.
    pub fn build(
        config: &AppConfig,
        cache: Arc<dyn CacheEngine>,
        store: Arc<dyn CatalogStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn ClockSource>,
    ) -> anyhow::Result<Self> {
        let codec = Arc::new(TokenCodec::new(&config.auth.signing_key)?);
        let sessions = Arc::new(SessionStore::new(Arc::clone(&cache)));
        let authenticator = Arc::new(SessionAuthenticator::new(
            Arc::clone(&codec),
            Arc::clone(&sessions),
        ));
        let filters: Vec<Arc<dyn RequestFilter>> = vec![
            Arc::new(UserIdFilter::new(Arc::clone(&store))),
            Arc::new(OrderOwnershipFilter::new(Arc::clone(&store))),
        ];
        let chain = Arc::new(AuthorizationChain::new(filters));

        let overlay = Arc::new(StatusOverlay::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::new(StatusGuard::new()),
            config.catalog.favorite_ttl,
        ));

        let ledger = Arc::new(CounterLedger::new(Arc::clone(&cache), Arc::clone(&store)));
        let notifier = Arc::new(CounterNotifier::new());
        notifier.register(Arc::new(FavoriteCountObserver::new(Arc::clone(&ledger))), 0);
        notifier.register(Arc::new(SalesCountObserver::new(Arc::clone(&ledger))), 1);

        let tracker = Arc::new(OrderCompletionTracker::new(
            Arc::clone(&cache),
            config.orders.completion_ttl,
        ));
        let consumer = OrderConsumer::new(
            Arc::clone(&store),
            Arc::clone(&tracker),
            Arc::clone(&notifier),
        );
        let order_queue = Arc::new(InProcessQueue::new(BackgroundWorker::start(
            "order-consumer",
            consumer,
            config.orders.queue_capacity,
            CONSUMER_TICK,
        )));
        let flusher = BackgroundWorker::start(
            "counter-flusher",
            CounterFlusher::new(ledger, Arc::clone(&store)),
            4,
            config.counters.flush_interval,
        );

        let login = Arc::new(LoginService::new(
            identity,
            Arc::clone(&store),
            codec,
            sessions,
            Arc::clone(&clock),
            &config.auth,
        ));
        let catalog = Arc::new(CatalogService::new(
            Arc::clone(&store),
            Arc::clone(&overlay),
            Arc::clone(&cache),
            &config.catalog,
        ));
        let favorites = Arc::new(FavoritesService::new(
            Arc::clone(&store),
            overlay,
            Arc::clone(&notifier),
        ));
        let orders = Arc::new(OrderService::new(
            store,
            order_queue.clone(),
            tracker,
            clock,
        ));

        info!(observers = notifier.len(), "application assembled");

        Ok(Self {
            state: AppState {
                shutdown: Arc::new(ShutdownController::new()),
                cache,
                authenticator,
                chain,
                login,
                catalog,
                favorites,
                orders,
                start_time: Instant::now(),
            },
            notifier,
            order_queue,
            flusher,
        })
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    #[must_use]
    pub fn notifier(&self) -> Arc<CounterNotifier> {
        Arc::clone(&self.notifier)
    }

    /// Queues an immediate flush of every counter kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the flusher has been stopped.
    pub async fn flush_counters(&self) -> anyhow::Result<()> {
        self.flusher.submit(FlushRequest::All).await
    }

    /// Drains the order queue, then stops the flusher, which flushes once
    /// more on the way out.
    pub async fn stop(&self) {
        self.order_queue.stop().await;
        self.flusher.stop().await;
        info!("background workers stopped");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use canteen_core::{Combo, ComboDish, Dish, SystemClock};
    use serde_json::Value;

    use super::Canteen;
    use crate::network::AppState;
    use crate::service::{AppConfig, AuthConfig, Identity, IdentityProvider, LoginError};
    use crate::storage::datastores::{CatalogSeed, MemoryCatalog};
    use crate::storage::CacheEngine;

    /// Accepts `code-<openid>`; anything else is an upstream failure.
    pub(crate) struct StubIdentity;

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn exchange(&self, code: &str) -> Result<Identity, LoginError> {
            let openid = code
                .strip_prefix("code-")
                .ok_or_else(|| LoginError::UpstreamIdentity("errcode 40029".to_string()))?;
            let mut fields = serde_json::Map::new();
            fields.insert("openid".to_string(), Value::from(openid));
            fields.insert("session_key".to_string(), Value::from("sk"));
            Identity::from_response(fields)
        }
    }

    pub(crate) fn seed() -> CatalogSeed {
        let dishes = (1..=4)
            .map(|id| Dish {
                id,
                name: format!("dish-{id}"),
                price: 8.0,
                image: format!("{id}.png"),
                sale: u64::from(id),
                like_count: 0,
                store_id: 1,
                tags: vec![],
                is_new: id <= 2,
                is_recommended: id >= 3,
            })
            .collect();
        CatalogSeed {
            dishes,
            combos: vec![Combo {
                id: 100_000,
                name: "lunch".to_string(),
                price: 15.0,
                sale: 0,
                tags: vec![],
                dishes: vec![
                    ComboDish {
                        dish_id: 1,
                        quantity: 1,
                        image: "lunch.png".to_string(),
                    },
                    ComboDish {
                        dish_id: 3,
                        quantity: 2,
                        image: String::new(),
                    },
                ],
            }],
            stock: BTreeMap::from([(1, 5), (3, 5)]),
            users: vec![],
        }
    }

    pub(crate) fn config() -> AppConfig {
        AppConfig {
            auth: AuthConfig {
                signing_key: b"test-signing-key".to_vec(),
                ..AuthConfig::default()
            },
            ..AppConfig::default()
        }
    }

    pub(crate) fn build(cache: Arc<dyn CacheEngine>) -> (Canteen, Arc<MemoryCatalog>) {
        let store = Arc::new(MemoryCatalog::from_seed(seed()));
        let app = Canteen::build(
            &config(),
            cache,
            store.clone(),
            Arc::new(StubIdentity),
            Arc::new(SystemClock),
        )
        .unwrap();
        (app, store)
    }

    pub(crate) fn state_with_cache(cache: Arc<dyn CacheEngine>) -> AppState {
        build(cache).0.state()
    }
}

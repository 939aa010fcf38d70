//! Canteen server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use canteen_core::SystemClock;
use canteen_server::network::NetworkModule;
use canteen_server::service::{AppConfig, WeChatIdentityProvider};
use canteen_server::storage::datastores::{CatalogSeed, MemoryCatalog};
#[cfg(feature = "redis")]
use canteen_server::storage::engines::RedisCache;
use canteen_server::storage::engines::HashMapCache;
use canteen_server::storage::CacheEngine;
use canteen_server::Canteen;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "canteen", version, about = "Canteen ordering server")]
struct Args {
    #[arg(long, env = "CANTEEN_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "CANTEEN_PORT", default_value_t = 8080)]
    port: u16,

    /// HMAC key for session tokens.
    #[arg(long, env = "CANTEEN_SIGNING_KEY", hide_env_values = true)]
    signing_key: String,

    #[arg(long, env = "CANTEEN_ISSUER", default_value = "canteen")]
    issuer: String,

    /// Session lifetime in seconds.
    #[arg(long, env = "CANTEEN_SESSION_TTL_SECS", default_value_t = 86_400)]
    session_ttl_secs: u64,

    #[arg(long, env = "CANTEEN_WECHAT_APP_ID", default_value = "")]
    wechat_app_id: String,

    #[arg(long, env = "CANTEEN_WECHAT_APP_SECRET", default_value = "", hide_env_values = true)]
    wechat_app_secret: String,

    #[arg(long, env = "CANTEEN_WECHAT_ENDPOINT")]
    wechat_endpoint: Option<String>,

    /// JSON file with the initial catalog.
    #[arg(long, env = "CANTEEN_CATALOG_SEED")]
    catalog_seed: Option<PathBuf>,

    /// Counter flush interval in seconds.
    #[arg(long, env = "CANTEEN_FLUSH_INTERVAL_SECS", default_value_t = 300)]
    flush_interval_secs: u64,

    /// Redis URL. Without it the in-process cache is used.
    #[cfg(feature = "redis")]
    #[arg(long, env = "CANTEEN_REDIS_URL")]
    redis_url: Option<String>,

    /// Address for the Prometheus scrape endpoint. Disabled when unset.
    #[arg(long, env = "CANTEEN_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CANTEEN_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn app_config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.network.host.clone_from(&self.host);
        config.network.port = self.port;
        config.auth.signing_key = self.signing_key.as_bytes().to_vec();
        config.auth.issuer.clone_from(&self.issuer);
        config.auth.session_ttl = Duration::from_secs(self.session_ttl_secs);
        config.wechat.app_id.clone_from(&self.wechat_app_id);
        config.wechat.app_secret.clone_from(&self.wechat_app_secret);
        if let Some(endpoint) = &self.wechat_endpoint {
            config.wechat.endpoint.clone_from(endpoint);
        }
        config.counters.flush_interval = Duration::from_secs(self.flush_interval_secs);
        config
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "redis")]
async fn connect_cache(args: &Args) -> anyhow::Result<Arc<dyn CacheEngine>> {
    if let Some(url) = &args.redis_url {
        let cache = RedisCache::connect(url)
            .await
            .context("connecting to redis")?;
        info!("using redis cache");
        return Ok(Arc::new(cache));
    }
    Ok(in_process_cache())
}

#[cfg(not(feature = "redis"))]
async fn connect_cache(_args: &Args) -> anyhow::Result<Arc<dyn CacheEngine>> {
    Ok(in_process_cache())
}

fn in_process_cache() -> Arc<dyn CacheEngine> {
    info!("using in-process cache");
    Arc::new(HashMapCache::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "terminate handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing prometheus exporter")?;
        info!(%addr, "prometheus exporter listening");
    }

    let config = args.app_config();
    let seed = match &args.catalog_seed {
        Some(path) => CatalogSeed::from_json_file(path)?,
        None => {
            warn!("no catalog seed given, starting with an empty catalog");
            CatalogSeed::default()
        }
    };
    let store = Arc::new(MemoryCatalog::from_seed(seed));
    let cache = connect_cache(&args).await?;
    let identity = Arc::new(WeChatIdentityProvider::new(config.wechat.clone())?);

    let app = Canteen::build(&config, cache, store, identity, Arc::new(SystemClock))?;

    let mut network = NetworkModule::new(config.network.clone(), app.state());
    let port = network.start().await?;
    info!(port, "canteen server starting");

    let ctrl = network.shutdown_controller();
    network
        .serve(async move {
            shutdown_signal().await;
            ctrl.trigger_shutdown();
        })
        .await?;

    app.stop().await;
    info!("canteen server stopped");
    Ok(())
}

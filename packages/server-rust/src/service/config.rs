use std::fmt;
use std::time::Duration;

use crate::network::NetworkConfig;

/// Token signing and session lifetime.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens. Required; there is no usable default.
    pub signing_key: Vec<u8>,
    /// `iss` claim written into issued tokens.
    pub issuer: String,
    /// Lifetime of a session from login.
    pub session_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: Vec::new(),
            issuer: "canteen".to_string(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

/// Upstream identity exchange (WeChat `jscode2session`).
#[derive(Clone)]
pub struct WeChatConfig {
    pub endpoint: String,
    pub app_id: String,
    pub app_secret: String,
    pub timeout: Duration,
}

impl Default for WeChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.weixin.qq.com/sns/jscode2session".to_string(),
            app_id: String::new(),
            app_secret: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for WeChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeChatConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Order queue and completion tracking.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// How long a completion code stays pollable.
    pub completion_ttl: Duration,
    /// Messages that may wait in the in-process queue.
    pub queue_capacity: usize,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            completion_ttl: Duration::from_secs(30 * 60),
            queue_capacity: 256,
        }
    }
}

/// Counter delta flushing.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub flush_interval: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Catalog page caching and status bitmaps.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Lifetime of the cached index page.
    pub index_ttl: Duration,
    /// Lifetime of rebuilt per-user favorite bitmaps. `None` keeps them
    /// until evicted.
    pub favorite_ttl: Option<Duration>,
    /// Number of dishes in the index page's hot list.
    pub hot_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_ttl: Duration::from_secs(3 * 60),
            favorite_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            hot_limit: 15,
        }
    }
}

/// Everything the server needs to start.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub wechat: WeChatConfig,
    pub orders: OrderConfig,
    pub counters: CounterConfig,
    pub catalog: CatalogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert!(config.auth.signing_key.is_empty());
        assert_eq!(config.auth.issuer, "canteen");
        assert_eq!(config.auth.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.orders.queue_capacity, 256);
        assert_eq!(config.catalog.index_ttl, Duration::from_secs(180));
        assert_eq!(config.catalog.hot_limit, 15);
        assert!(config.wechat.endpoint.ends_with("/jscode2session"));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = AppConfig {
            auth: AuthConfig {
                signing_key: b"super-secret".to_vec(),
                ..AuthConfig::default()
            },
            wechat: WeChatConfig {
                app_secret: "wx-secret".to_string(),
                ..WeChatConfig::default()
            },
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("wx-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}

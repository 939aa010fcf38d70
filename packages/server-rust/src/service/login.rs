//! Login: exchange an upstream identity code for a session token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canteen_core::ClockSource;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::config::{AuthConfig, WeChatConfig};
use crate::auth::{SessionStore, TokenCodec, TokenError};
use crate::storage::CacheError;
use crate::traits::CatalogStore;

/// Token subject for session tokens.
pub const TOKEN_SUBJECT: &str = "auth_token";

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("login code missing")]
    MissingCode,
    #[error("upstream identity exchange failed: {0}")]
    UpstreamIdentity(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("persistent store failed")]
    Store(#[source] anyhow::Error),
}

/// Identity returned by the upstream provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub openid: String,
    pub session_key: Option<String>,
    /// Every field the provider returned, verbatim.
    pub fields: Map<String, Value>,
}

impl Identity {
    /// Interprets a `jscode2session`-style response body.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::UpstreamIdentity`] when the body carries a
    /// non-zero `errcode` or no `openid`.
    pub fn from_response(fields: Map<String, Value>) -> Result<Self, LoginError> {
        if let Some(code) = fields.get("errcode").and_then(Value::as_i64) {
            if code != 0 {
                let message = fields
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or("no message");
                return Err(LoginError::UpstreamIdentity(format!(
                    "errcode {code}: {message}"
                )));
            }
        }
        let openid = fields
            .get("openid")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LoginError::UpstreamIdentity("response has no openid".to_string()))?
            .to_string();
        let session_key = fields
            .get("session_key")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            openid,
            session_key,
            fields,
        })
    }
}

/// Exchanges a client-supplied login code for an identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Identity, LoginError>;
}

/// [`IdentityProvider`] backed by the WeChat mini-program code exchange.
pub struct WeChatIdentityProvider {
    client: reqwest::Client,
    config: WeChatConfig,
}

impl WeChatIdentityProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: WeChatConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl IdentityProvider for WeChatIdentityProvider {
    async fn exchange(&self, code: &str) -> Result<Identity, LoginError> {
        let upstream = |e: reqwest::Error| LoginError::UpstreamIdentity(e.to_string());
        let body: Map<String, Value> = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;
        Identity::from_response(body)
    }
}

/// Issues sessions for upstream identities.
pub struct LoginService {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn CatalogStore>,
    codec: Arc<TokenCodec>,
    sessions: Arc<SessionStore>,
    clock: Arc<dyn ClockSource>,
    issuer: String,
    session_ttl: Duration,
}

impl LoginService {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn CatalogStore>,
        codec: Arc<TokenCodec>,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn ClockSource>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            provider,
            store,
            codec,
            sessions,
            clock,
            issuer: config.issuer.clone(),
            session_ttl: config.session_ttl,
        }
    }

    /// Logs a user in with an upstream code.
    ///
    /// On success the user row exists, a session is open for the new token,
    /// and the returned map holds the provider's fields plus `token`. On an
    /// upstream failure nothing is written.
    ///
    /// # Errors
    ///
    /// - [`LoginError::MissingCode`] for an empty code
    /// - [`LoginError::UpstreamIdentity`] when the exchange fails
    /// - store, signing or cache failures while opening the session
    pub async fn login(&self, code: &str) -> Result<Map<String, Value>, LoginError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LoginError::MissingCode);
        }

        let identity = match self.provider.exchange(code).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "identity exchange failed");
                return Err(e);
            }
        };
        let user_id = identity.openid.as_str();

        if !self.store.has_user(user_id).await.map_err(LoginError::Store)? {
            self.store.add_user(user_id).await.map_err(LoginError::Store)?;
            info!(user_id, "new user registered");
        }

        let token = self
            .codec
            .builder()
            .issuer(self.issuer.as_str())
            .subject(TOKEN_SUBJECT)
            .issued_at(self.clock.now())
            .claim("nonce", rand::random::<u32>())
            .build()?;
        self.sessions
            .store(&token, user_id, self.session_ttl)
            .await?;
        debug!(user_id, "session opened");

        let mut body = identity.fields;
        body.insert("token".to_string(), Value::String(token));
        Ok(body)
    }

    /// Ends the session for `token`. Returns `true` if one was live.
    ///
    /// # Errors
    ///
    /// Returns the cache failure if the delete does not go through.
    pub async fn logout(&self, token: &str) -> Result<bool, CacheError> {
        self.sessions.invalidate(token).await
    }
}

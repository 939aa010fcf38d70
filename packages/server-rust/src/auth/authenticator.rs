//! Session interceptor logic: token in, user id out.

use std::sync::Arc;

use canteen_core::UserId;
use tracing::debug;

use super::error::AuthError;
use super::session::SessionStore;
use super::token::TokenCodec;

/// Resolves the caller behind a session token.
///
/// A request is authenticated only when the token's signature verifies
/// **and** a live session exists for it. The user id comes from the session
/// entry, never from the token's claims.
pub struct SessionAuthenticator {
    codec: Arc<TokenCodec>,
    sessions: Arc<SessionStore>,
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, sessions: Arc<SessionStore>) -> Self {
        Self { codec, sessions }
    }

    /// # Errors
    ///
    /// - [`AuthError::MissingToken`] when no token was sent
    /// - [`AuthError::InvalidToken`] when the signature does not verify
    /// - [`AuthError::SessionExpired`] when no live session exists
    /// - [`AuthError::Cache`] when the session cache cannot be read
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        if let Err(e) = self.codec.verify(token) {
            debug!(error = %e, "token rejected");
            return Err(AuthError::InvalidToken(e));
        }

        match self.sessions.lookup(token).await? {
            Some(user_id) => Ok(user_id),
            None => {
                debug!("token verified but session is gone");
                Err(AuthError::SessionExpired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use canteen_core::ManualClock;

    use super::*;
    use crate::storage::engines::HashMapCache;

    struct Fixture {
        auth: SessionAuthenticator,
        codec: Arc<TokenCodec>,
        sessions: Arc<SessionStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(HashMapCache::with_clock(clock.clone()));
        let codec = Arc::new(TokenCodec::new(b"k").unwrap());
        let sessions = Arc::new(SessionStore::new(cache));
        Fixture {
            auth: SessionAuthenticator::new(codec.clone(), sessions.clone()),
            codec,
            sessions,
            clock,
        }
    }

    #[tokio::test]
    async fn valid_token_with_live_session_authenticates() {
        let f = fixture();
        let token = f.codec.build("i", "s", 1, BTreeMap::new()).unwrap();
        f.sessions
            .store(&token, "u-1", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(f.auth.authenticate(Some(&token)).await.unwrap(), "u-1");
    }

    #[tokio::test]
    async fn missing_and_blank_tokens_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.auth.authenticate(None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            f.auth.authenticate(Some("  ")).await,
            Err(AuthError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn session_for_forged_token_is_not_honoured() {
        let f = fixture();
        // A session entry exists, but the token was never signed by us.
        f.sessions
            .store("forged", "u-1", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(matches!(
            f.auth.authenticate(Some("forged")).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn verified_token_without_session_is_expired() {
        let f = fixture();
        let token = f.codec.build("i", "s", 1, BTreeMap::new()).unwrap();
        f.sessions
            .store(&token, "u-1", Duration::from_secs(10))
            .await
            .unwrap();
        f.clock.advance(10_000);
        assert!(matches!(
            f.auth.authenticate(Some(&token)).await,
            Err(AuthError::SessionExpired)
        ));
    }
}

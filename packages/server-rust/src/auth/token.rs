//! Signed session tokens.
//!
//! A token is an HS256 JWT carrying `iss`, `sub`, `iat` (milliseconds) and
//! any number of extra claims. It is verifiable from the signing key alone;
//! whether the session it names is still alive is the session store's
//! business, so no expiry is encoded or checked here.

use std::collections::{BTreeMap, HashSet};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const RESERVED_CLAIMS: [&str; 3] = ["iss", "sub", "iat"];

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    /// Issue time in milliseconds since Unix epoch.
    pub iat: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("token failed verification: {0}")]
    Verification(String),
}

/// Builds and verifies tokens with one HMAC key.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Creates a codec signing with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if `secret` is empty.
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Signing("signing key is empty".to_string()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Starts a fluent token build.
    #[must_use]
    pub fn builder(&self) -> TokenBuilder<'_> {
        TokenBuilder {
            codec: self,
            claims: TokenClaims {
                iss: String::new(),
                sub: String::new(),
                iat: 0,
                extra: BTreeMap::new(),
            },
        }
    }

    /// Signs a token. Identical inputs produce identical tokens.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if an extra claim reuses a reserved
    /// name or serialization fails.
    pub fn build(
        &self,
        issuer: &str,
        subject: &str,
        issued_at_millis: u64,
        claims: BTreeMap<String, Value>,
    ) -> Result<String, TokenError> {
        self.sign(&TokenClaims {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            iat: issued_at_millis,
            extra: claims,
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        if let Some(name) = RESERVED_CLAIMS
            .iter()
            .find(|name| claims.extra.contains_key(**name))
        {
            return Err(TokenError::Signing(format!("claim {name} is reserved")));
        }
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks the signature and decodes the claims.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Verification`] for malformed tokens, foreign
    /// algorithms, or signature mismatches.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Verification(e.to_string()))
    }
}

/// Fluent builder returned by [`TokenCodec::builder`].
pub struct TokenBuilder<'a> {
    codec: &'a TokenCodec,
    claims: TokenClaims,
}

impl TokenBuilder<'_> {
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims.iss = issuer.into();
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.claims.sub = subject.into();
        self
    }

    #[must_use]
    pub fn issued_at(mut self, millis: u64) -> Self {
        self.claims.iat = millis;
        self
    }

    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.extra.insert(name.into(), value.into());
        self
    }

    /// Signs the accumulated claims.
    ///
    /// # Errors
    ///
    /// See [`TokenCodec::build`].
    pub fn build(self) -> Result<String, TokenError> {
        self.codec.sign(&self.claims)
    }
}

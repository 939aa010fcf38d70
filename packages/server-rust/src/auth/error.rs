use super::token::TokenError;
use crate::storage::CacheError;

/// Why a request was not let through.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,
    #[error("invalid session token")]
    InvalidToken(#[source] TokenError),
    #[error("session expired")]
    SessionExpired,
    #[error("rejected by {filter}")]
    Rejected { filter: &'static str },
    #[error("session cache unavailable")]
    Cache(#[from] CacheError),
    #[error("authorization check failed in {filter}")]
    Check {
        filter: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AuthError {
    /// Returns `true` for failures that mean "not authenticated or not
    /// allowed", as opposed to infrastructure faults.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken
                | AuthError::InvalidToken(_)
                | AuthError::SessionExpired
                | AuthError::Rejected { .. }
        )
    }

    /// Label used for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing-token",
            AuthError::InvalidToken(_) => "invalid-token",
            AuthError::SessionExpired => "session-expired",
            AuthError::Rejected { .. } => "rejected",
            AuthError::Cache(_) => "cache",
            AuthError::Check { .. } => "check-failed",
        }
    }
}

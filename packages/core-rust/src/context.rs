use std::collections::BTreeMap;

use crate::types::UserId;

/// Per-request context handed to authorization filters.
///
/// Carries the request path, its query parameters, and the caller resolved by
/// the session interceptor.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request path, without the query string.
    pub path: String,
    /// Decoded query parameters.
    pub params: BTreeMap<String, String>,
    /// Authenticated caller, if the session interceptor resolved one.
    pub user_id: Option<UserId>,
    /// Request id assigned by the HTTP layer, for log correlation.
    pub request_id: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_params_and_caller() {
        let ctx = RequestContext::new("/orders/status")
            .with_param("orderId", "o-1")
            .with_user("u-1");
        assert_eq!(ctx.path, "/orders/status");
        assert_eq!(ctx.param("orderId"), Some("o-1"));
        assert_eq!(ctx.param("userId"), None);
        assert_eq!(ctx.user_id.as_deref(), Some("u-1"));
    }
}

//! Ordered authorization filters.
//!
//! Each [`RequestFilter`] decides whether it applies to a request and, if it
//! does, whether the request passes. [`AuthorizationChain`] walks the filters
//! in order and stops at the first rejection.

use std::sync::Arc;

use async_trait::async_trait;
use canteen_core::RequestContext;
use tracing::{debug, trace};

use super::error::AuthError;

/// One authorization check.
#[async_trait]
pub trait RequestFilter: Send + Sync {
    /// Stable name, reported when the filter rejects.
    fn name(&self) -> &'static str;

    /// Whether this filter has an opinion on `request`.
    fn is_applicable(&self, request: &RequestContext) -> bool;

    /// Returns `Ok(true)` to pass, `Ok(false)` to reject.
    async fn check(&self, request: &RequestContext) -> anyhow::Result<bool>;
}

/// Filters applied in registration order.
#[derive(Default, Clone)]
pub struct AuthorizationChain {
    filters: Vec<Arc<dyn RequestFilter>>,
}

impl AuthorizationChain {
    #[must_use]
    pub fn new(filters: Vec<Arc<dyn RequestFilter>>) -> Self {
        Self { filters }
    }

    /// Appends a filter to the end of the chain.
    pub fn push(&mut self, filter: Arc<dyn RequestFilter>) {
        self.filters.push(filter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs the chain.
    ///
    /// Filters that do not apply are skipped. The first applicable filter
    /// that fails rejects the request and later filters never run.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Rejected`] naming the filter that failed
    /// - [`AuthError::Check`] if a filter could not reach its data
    pub async fn authorize(&self, request: &RequestContext) -> Result<(), AuthError> {
        for filter in &self.filters {
            let name = filter.name();
            if !filter.is_applicable(request) {
                trace!(filter = name, "filter not applicable");
                continue;
            }
            match filter.check(request).await {
                Ok(true) => trace!(filter = name, "filter passed"),
                Ok(false) => {
                    debug!(filter = name, path = %request.path, "request rejected");
                    return Err(AuthError::Rejected { filter: name });
                }
                Err(source) => {
                    return Err(AuthError::Check {
                        filter: name,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

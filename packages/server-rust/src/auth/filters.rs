//! Concrete [`RequestFilter`]s.

use std::sync::Arc;

use async_trait::async_trait;
use canteen_core::RequestContext;

use super::chain::RequestFilter;
use crate::traits::CatalogStore;

/// Query parameter naming a user.
pub const USER_ID_PARAM: &str = "userId";
/// Query parameter naming an order.
pub const ORDER_ID_PARAM: &str = "orderId";

/// Guards requests that name a user: the user must exist and be the caller.
pub struct UserIdFilter {
    store: Arc<dyn CatalogStore>,
}

impl UserIdFilter {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestFilter for UserIdFilter {
    fn name(&self) -> &'static str {
        "user-id"
    }

    fn is_applicable(&self, request: &RequestContext) -> bool {
        request.param(USER_ID_PARAM).is_some()
    }

    async fn check(&self, request: &RequestContext) -> anyhow::Result<bool> {
        let (Some(named), Some(caller)) = (request.param(USER_ID_PARAM), request.user_id.as_deref())
        else {
            return Ok(false);
        };
        if named != caller {
            return Ok(false);
        }
        self.store.has_user(named).await
    }
}

/// Guards requests that name an order: the order must exist and belong to
/// the caller.
pub struct OrderOwnershipFilter {
    store: Arc<dyn CatalogStore>,
}

impl OrderOwnershipFilter {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestFilter for OrderOwnershipFilter {
    fn name(&self) -> &'static str {
        "order-ownership"
    }

    fn is_applicable(&self, request: &RequestContext) -> bool {
        request.param(ORDER_ID_PARAM).is_some()
    }

    async fn check(&self, request: &RequestContext) -> anyhow::Result<bool> {
        let (Some(order_id), Some(caller)) =
            (request.param(ORDER_ID_PARAM), request.user_id.as_deref())
        else {
            return Ok(false);
        };
        let owner = self.store.order_owner(order_id).await?;
        Ok(owner.as_deref() == Some(caller))
    }
}

//! Logical cache keyspace.
//!
//! Every cache key the server touches is produced here so the layout lives
//! in one place:
//!
//! | Key | Value |
//! |-----|-------|
//! | `session:{digest}` | user id, TTL = session lifetime |
//! | `status:{axis}` | bitmap over entity ids |
//! | `status:user:{userId}:{axis}` | per-user bitmap over entity ids |
//! | `order:completion:{orderId}` | completion code, TTL-bounded |
//! | `counter:delta:{kind}:{entityId}` | pending counter delta |
//! | `catalog:index` | rendered index page, short TTL |

use crate::types::{CounterKind, EntityId, StatusAxis};

/// Session entry for a token, keyed by the token's digest.
#[must_use]
pub fn session(token_digest: &str) -> String {
    format!("session:{token_digest}")
}

/// Global status bitmap for `axis`.
#[must_use]
pub fn status(axis: StatusAxis) -> String {
    format!("status:{axis}")
}

/// Per-user status bitmap for `axis`.
#[must_use]
pub fn user_status(user_id: &str, axis: StatusAxis) -> String {
    format!("status:user:{user_id}:{axis}")
}

#[must_use]
pub fn order_completion(order_id: &str) -> String {
    format!("order:completion:{order_id}")
}

#[must_use]
pub fn counter_delta(kind: CounterKind, entity_id: EntityId) -> String {
    format!("counter:delta:{kind}:{entity_id}")
}

/// Cached rendering of the catalog index page.
pub const CATALOG_INDEX: &str = "catalog:index";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(session("ab12"), "session:ab12");
        assert_eq!(status(StatusAxis::Publish), "status:publish");
        assert_eq!(status(StatusAxis::ComboPublish), "status:combo-publish");
        assert_eq!(
            user_status("o-123", StatusAxis::Favorite),
            "status:user:o-123:favorite"
        );
        assert_eq!(order_completion("ord-1"), "order:completion:ord-1");
        assert_eq!(
            counter_delta(CounterKind::Likes, 42),
            "counter:delta:likes:42"
        );
    }

    #[test]
    fn user_keys_do_not_collide_with_global_keys() {
        assert_ne!(
            user_status("publish", StatusAxis::Favorite),
            status(StatusAxis::Publish)
        );
    }
}

//! Authentication and authorization.
//!
//! - [`TokenCodec`] signs and verifies opaque session tokens
//! - [`SessionStore`] maps live tokens to users in the cache
//! - [`SessionAuthenticator`] combines the two into the session interceptor
//! - [`AuthorizationChain`] runs ordered [`RequestFilter`]s after it

pub mod authenticator;
pub mod chain;
pub mod error;
pub mod filters;
pub mod session;
pub mod token;

pub use authenticator::SessionAuthenticator;
pub use chain::{AuthorizationChain, RequestFilter};
pub use error::AuthError;
pub use filters::{OrderOwnershipFilter, UserIdFilter, ORDER_ID_PARAM, USER_ID_PARAM};
pub use session::SessionStore;
pub use token::{TokenBuilder, TokenClaims, TokenCodec, TokenError};

//! HTTP surface of the auth core.
//!
//! Request/response models, handlers, the role-checking middleware and the
//! router that wires them to [`crate::services::AuthService`].

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use middleware::{BearerToken, require_roles};
pub use routes::auth_router;

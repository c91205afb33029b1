//! Defines the HTTP routes specifically for authentication.
//!
//! Mounted under `/auth` by the server binary. Routes behind
//! [`require_roles`] receive the authenticated `Account` as an extension.

use crate::auth::handlers::*;
use crate::auth::middleware::require_roles;
use crate::database::models::Role;
use crate::services::RoleSet;
use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

/// Creates the authentication router with all auth-related routes
pub fn auth_router() -> Router {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/admin/login", post(admin_login))
        .route("/vendor/login", post(vendor_login))
        .route("/refresh", post(refresh_token))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/email/verify", post(verify_email));

    let authenticated = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", post(change_password))
        .route("/email/resend", post(resend_verification))
        .route_layer(middleware::from_fn_with_state(RoleSet::any(), require_roles));

    let admin = Router::new()
        .route("/accounts/{account_id}/active", patch(set_account_active))
        .route_layer(middleware::from_fn_with_state(
            RoleSet::only(Role::Admin),
            require_roles,
        ));

    public.merge(authenticated).merge(admin)
}

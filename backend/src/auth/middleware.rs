//! Middleware for protecting authenticated routes and handling authorization.
//!
//! [`require_roles`] runs the `require_auth` guard for a route and, on
//! success, stores the [`Account`] and the presented [`BearerToken`] in the
//! request extensions for the handler.

use crate::api::common::auth_error_to_http;
use crate::database::models::Account;
use crate::errors::AuthError;
use crate::services::{AuthService, RoleSet};
use axum::{
    extract::{Extension, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// The raw access token of the current request.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authentication plus role check. Attach with
/// `middleware::from_fn_with_state(RoleSet::only(Role::Admin), require_roles)`.
pub async fn require_roles(
    State(required): State<RoleSet>,
    Extension(auth): Extension<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| auth_error_to_http(AuthError::InvalidToken))?
        .to_string();

    let account: Account = auth
        .require_auth(&token, &required)
        .await
        .map_err(auth_error_to_http)?;

    request.extensions_mut().insert(account);
    request.extensions_mut().insert(BearerToken(token));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}

//! Handler functions for authentication-related API endpoints.
//!
//! These functions parse and validate request bodies, build the client
//! context for login history, and delegate to [`AuthService`].

use crate::api::common::{ApiResponse, auth_error_to_http, validation_error_response};
use crate::auth::middleware::BearerToken;
use crate::auth::models::*;
use crate::database::models::{Account, PublicAccount, Role};
use crate::services::token::TokenPair;
use crate::services::{AuthService, ClientContext, RoleSet};
use axum::{
    extract::{ConnectInfo, Extension, Json, Path},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::{Json as ResponseJson, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use validator::Validate;

type HandlerResult<T> = Result<ResponseJson<ApiResponse<T>>, Response>;

/// The peer address is recorded unless the deployment declares a reverse
/// proxy in front of us, in which case the first `X-Forwarded-For` hop wins.
fn client_context(
    headers: &HeaderMap,
    addr: SocketAddr,
    trust_forwarded_for: bool,
) -> ClientContext {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let source_address = forwarded
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string());
    let client_descriptor = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    ClientContext::new(source_address, client_descriptor)
}

/// Handle self-registration
#[axum::debug_handler]
pub async fn register(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PublicAccount>>), Response> {
    payload.validate().map_err(validation_error_response)?;

    let account = auth
        .register(
            &payload.name,
            &payload.email,
            &payload.password,
            payload.role.as_deref(),
            payload.consent(),
        )
        .await
        .map_err(auth_error_to_http)?;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(
            account.public_view(),
            "Registration successful. Please verify your email.",
        )),
    ))
}

async fn login_with(
    auth: &AuthService,
    portal: Option<RoleSet>,
    headers: &HeaderMap,
    addr: SocketAddr,
    payload: LoginRequest,
) -> HandlerResult<LoginResponse> {
    payload.validate().map_err(validation_error_response)?;

    let client = client_context(headers, addr, auth.settings().trust_forwarded_for);

    let outcome = match portal {
        Some(portal) => {
            auth.login_to_portal(&portal, &payload.email, &payload.password, &client)
                .await
        }
        None => auth.login(&payload.email, &payload.password, &client).await,
    }
    .map_err(auth_error_to_http)?;

    Ok(ResponseJson(ApiResponse::success(
        LoginResponse::new(outcome.tokens, outcome.account),
        "Login successful",
    )))
}

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    Extension(auth): Extension<Arc<AuthService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> HandlerResult<LoginResponse> {
    login_with(&auth, None, &headers, addr, payload).await
}

/// Login for the admin panel
#[axum::debug_handler]
pub async fn admin_login(
    Extension(auth): Extension<Arc<AuthService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> HandlerResult<LoginResponse> {
    let portal = RoleSet::only(Role::Admin);
    login_with(&auth, Some(portal), &headers, addr, payload).await
}

/// Login for the vendor panel
#[axum::debug_handler]
pub async fn vendor_login(
    Extension(auth): Extension<Arc<AuthService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> HandlerResult<LoginResponse> {
    let portal = RoleSet::only(Role::Vendor);
    login_with(&auth, Some(portal), &headers, addr, payload).await
}

/// Handle token refresh request
#[axum::debug_handler]
pub async fn refresh_token(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<RefreshTokenRequest>,
) -> HandlerResult<TokenPair> {
    payload.validate().map_err(validation_error_response)?;

    let tokens = auth
        .refresh(&payload.refresh_token)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::ok(tokens)))
}

/// Revokes the current access token and, when a body names one, the
/// refresh token. The body is optional.
#[axum::debug_handler]
pub async fn logout(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    payload: Option<Json<LogoutRequest>>,
) -> HandlerResult<()> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    auth.logout(&token, payload.refresh_token.as_deref())
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success((), "Logged out successfully")))
}

/// Get the current account
#[axum::debug_handler]
pub async fn me(Extension(account): Extension<Account>) -> HandlerResult<PublicAccount> {
    Ok(ResponseJson(ApiResponse::ok(account.public_view())))
}

/// Change the password of the current account; returns fresh tokens
#[axum::debug_handler]
pub async fn change_password(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(account): Extension<Account>,
    Json(payload): Json<ChangePasswordRequest>,
) -> HandlerResult<TokenPair> {
    payload.validate().map_err(validation_error_response)?;

    let tokens = auth
        .change_password(&account, &payload.current_password, &payload.new_password)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success(
        tokens,
        "Password changed successfully",
    )))
}

#[axum::debug_handler]
pub async fn forgot_password(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> HandlerResult<()> {
    payload.validate().map_err(validation_error_response)?;

    auth.request_password_reset(&payload.email)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success(
        (),
        "If an account exists for that email, a reset link has been sent",
    )))
}

#[axum::debug_handler]
pub async fn reset_password(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> HandlerResult<()> {
    payload.validate().map_err(validation_error_response)?;

    auth.reset_password(&payload.token, &payload.password)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success(
        (),
        "Password has been reset. Please log in.",
    )))
}

#[axum::debug_handler]
pub async fn verify_email(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<VerifyEmailRequest>,
) -> HandlerResult<PublicAccount> {
    payload.validate().map_err(validation_error_response)?;

    let account = auth
        .verify_email(&payload.token)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success(account, "Email verified")))
}

#[axum::debug_handler]
pub async fn resend_verification(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(account): Extension<Account>,
) -> HandlerResult<()> {
    auth.resend_email_verification(&account)
        .await
        .map_err(auth_error_to_http)?;
    Ok(ResponseJson(ApiResponse::success(
        (),
        "Verification email sent",
    )))
}

/// Admin: activate or deactivate an account
#[axum::debug_handler]
pub async fn set_account_active(
    Extension(auth): Extension<Arc<AuthService>>,
    Path(account_id): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> HandlerResult<()> {
    auth.set_active(&account_id, payload.active)
        .await
        .map_err(auth_error_to_http)?;
    let message = if payload.active {
        "Account activated"
    } else {
        "Account deactivated"
    };
    Ok(ResponseJson(ApiResponse::success((), message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxied_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.2, 10.0.0.1"),
        );
        headers
    }

    #[test]
    fn test_client_context_ignores_forwarded_for_by_default() {
        let addr: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let client = client_context(&proxied_headers(), addr, false);
        assert_eq!(client.source_address, "10.0.0.5");
        assert_eq!(client.client_descriptor, "curl/8.0");
    }

    #[test]
    fn test_client_context_honors_forwarded_for_behind_trusted_proxy() {
        let addr: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let client = client_context(&proxied_headers(), addr, true);
        assert_eq!(client.source_address, "198.51.100.2");
    }

    #[test]
    fn test_client_context_falls_back_to_peer() {
        let addr: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let client = client_context(&HeaderMap::new(), addr, true);
        assert_eq!(client.source_address, "10.0.0.5");
        assert_eq!(client.client_descriptor, "unknown");
    }
}

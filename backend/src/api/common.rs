//! Error handling utilities for API responses.
//!
//! Provides the response envelope shared by every endpoint and the mapping
//! from [`AuthError`] kinds to HTTP responses.
//!
//! # Response Format
//! All errors return consistent JSON responses containing:
//! - `message`: Human-readable message
//! - `error.error_type`: Machine-readable error category (see [`AuthError::kind`])
//! - `error.details`: Optional field-specific validation errors
//!
//! Locked accounts additionally get a `Retry-After` header, and failures
//! that call for re-authentication get `WWW-Authenticate: Bearer`.

use crate::errors::AuthError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::{RETRY_AFTER, WWW_AUTHENTICATE}},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper for all endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Indicates if the request was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable message
    pub message: String,
    /// Error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    /// Request timestamp
    pub timestamp: String,
}

/// Error details for failed requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error type identifier
    pub error_type: String,
    /// Seconds until a locked account may retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Field-specific validation errors when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-specific validation error details
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the field with validation error
    pub field: String,
    /// Description of the validation failure
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a successful response with default message
    pub fn ok(data: T) -> Self {
        Self::success(data, "Request successful")
    }

    /// Create an error response
    pub fn error(
        message: impl Into<String>,
        error_type: impl Into<String>,
        details: Option<Vec<FieldError>>,
    ) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            message: message.into(),
            error: Some(ErrorDetails {
                error_type: error_type.into(),
                retry_after: None,
                details,
            }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Validation { .. } | AuthError::InvalidResetToken => StatusCode::BAD_REQUEST,
        AuthError::DuplicateEmail => StatusCode::CONFLICT,
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::ExpiredToken
        | AuthError::StaleToken
        | AuthError::RevokedToken
        | AuthError::UnknownAccount => StatusCode::UNAUTHORIZED,
        AuthError::AccountLocked { .. } => StatusCode::LOCKED,
        AuthError::AccountDisabled | AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::Store { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Converts AuthError to the appropriate HTTP response with standard format
pub fn auth_error_to_http(error: AuthError) -> Response {
    let status = status_for(&error);
    let message = match &error {
        AuthError::Store { source } => {
            tracing::error!("Store error: {:#}", source);
            "Internal server error".to_string()
        }
        AuthError::Internal { message } => {
            tracing::error!("Internal error: {}", message);
            "Internal server error".to_string()
        }
        other => other.to_string(),
    };

    let mut body = ApiResponse::<()>::error(message, error.kind(), None);
    let retry_after = match &error {
        AuthError::AccountLocked {
            retry_after_secs, ..
        } => Some(*retry_after_secs),
        _ => None,
    };
    if let (Some(secs), Some(details)) = (retry_after, body.error.as_mut()) {
        details.retry_after = Some(secs);
    }

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    if error.is_authentication_failure() {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// Formats validator::ValidationErrors into field-specific error details
pub fn validation_errors_to_field_errors(errors: validator::ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .unwrap_or(&"Invalid value".into())
                    .to_string(),
            })
        })
        .collect()
}

/// Helper to create validation error response
pub fn validation_error_response(errors: validator::ValidationErrors) -> Response {
    let field_errors = validation_errors_to_field_errors(errors);
    let error_response =
        ApiResponse::<()>::error("Validation failed", "validation_error", Some(field_errors));
    (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
}

//! Error taxonomy for the authentication and account-security core.
//!
//! Every rejected path returns one of these kinds as a typed value; the HTTP
//! layer (`api::common::auth_error_to_http`) maps each kind to a status code.
//! Messages never include password hashes, failure counters, or which login
//! factor was wrong.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the auth core.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input, caught before touching the store.
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("An account with this email already exists")]
    DuplicateEmail,

    /// Wrong email or wrong password. Deliberately does not say which.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked, retry after {retry_after_secs} seconds")]
    AccountLocked {
        locked_until: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    /// The password changed after this token was issued.
    #[error("Token is no longer valid, please log in again")]
    StaleToken,

    /// The token was explicitly revoked (logout or refresh rotation).
    #[error("Token has been revoked")]
    RevokedToken,

    /// The token referenced an account that no longer resolves.
    #[error("Account not found for token")]
    UnknownAccount,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid or expired token")]
    InvalidResetToken,

    #[error("Store error: {source}")]
    Store {
        #[from]
        source: anyhow::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Builds an `AccountLocked` error, computing the remaining lock time
    /// (rounded up to whole seconds) relative to `now`.
    pub fn locked(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining_ms = (locked_until - now).num_milliseconds().max(0) as u64;
        Self::AccountLocked {
            locked_until,
            retry_after_secs: remaining_ms.div_ceil(1000),
        }
    }

    /// Stable machine-readable identifier for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation { .. } => "validation_error",
            AuthError::DuplicateEmail => "duplicate_email",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::StaleToken => "stale_token",
            AuthError::RevokedToken => "revoked_token",
            AuthError::UnknownAccount => "unknown_account",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::InvalidResetToken => "invalid_reset_token",
            AuthError::Store { .. } => "store_error",
            AuthError::Internal { .. } => "internal_error",
        }
    }

    /// True for the kinds that mean "re-authenticate" (401 semantics).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::InvalidToken
                | AuthError::ExpiredToken
                | AuthError::StaleToken
                | AuthError::RevokedToken
                | AuthError::UnknownAccount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_locked_rounds_remaining_time_up() {
        let now = Utc::now();
        let err = AuthError::locked(now + Duration::milliseconds(1500), now);
        match err {
            AuthError::AccountLocked {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_locked_never_negative() {
        let now = Utc::now();
        let err = AuthError::locked(now - Duration::seconds(5), now);
        assert!(matches!(
            err,
            AuthError::AccountLocked {
                retry_after_secs: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_forbidden_is_not_an_authentication_failure() {
        assert!(!AuthError::forbidden("admin only").is_authentication_failure());
        assert!(AuthError::StaleToken.is_authentication_failure());
        assert_eq!(AuthError::InvalidCredentials.kind(), "invalid_credentials");
    }

    #[test]
    fn test_messages_do_not_reveal_factor() {
        let msg = AuthError::InvalidCredentials.to_string();
        assert_eq!(msg, "Invalid email or password");
    }
}

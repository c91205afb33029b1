//! Token Issuer: stateless JWT access/refresh tokens.
//!
//! Access and refresh tokens are signed with distinct HMAC secrets and carry
//! a `typ` claim, so neither can stand in for the other. Expiry is checked
//! against the injected [`Clock`] rather than inside `jsonwebtoken`, which
//! keeps "bad signature" and "expired" distinguishable and testable.

use crate::config::AuthSettings;
use crate::database::models::{Account, Role};
use crate::errors::{AuthError, AuthResult};
use crate::utils::Clock;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Account ID
    pub sub: String,
    pub role: Role,
    pub typ: TokenKind,
    /// Unique token id, used for revocation
    pub jti: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Issued-at with millisecond precision, compared against
    /// `password_changed_at`
    pub iat_ms: i64,
    /// Expiry, seconds since epoch, rounded up
    pub exp: i64,
    /// Expiry with millisecond precision; the authoritative deadline
    pub exp_ms: i64,
}

impl Claims {
    pub fn account_id(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.iat_ms)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.exp_ms)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.exp_ms
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(settings: &AuthSettings, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);

        TokenIssuer {
            access: SigningKeys::from_secret(&settings.access_token_secret),
            refresh: SigningKeys::from_secret(&settings.refresh_token_secret),
            access_ttl: settings.access_token_ttl,
            refresh_ttl: settings.refresh_token_ttl,
            validation,
            clock,
        }
    }

    /// Mints an access/refresh pair for `account`.
    pub fn issue(&self, account: &Account) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        let access_token = self.mint(account, TokenKind::Access, now)?;
        let refresh_token = self.mint(account, TokenKind::Refresh, now)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds().max(0) as u64,
            refresh_expires_in: self.refresh_ttl.num_seconds().max(0) as u64,
        })
    }

    fn mint(&self, account: &Account, kind: TokenKind, now: DateTime<Utc>) -> AuthResult<String> {
        let (keys, ttl) = match kind {
            TokenKind::Access => (&self.access, self.access_ttl),
            TokenKind::Refresh => (&self.refresh, self.refresh_ttl),
        };
        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::internal("Token lifetime out of range"))?;

        let claims = Claims {
            sub: account.id.clone(),
            role: account.role,
            typ: kind,
            jti: Uuid::now_v7().to_string(),
            iat: now.timestamp(),
            iat_ms: now.timestamp_millis(),
            exp: expires.timestamp() + i64::from(expires.timestamp_subsec_nanos() > 0),
            exp_ms: expires.timestamp_millis(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::internal(format!("Token generation failed: {}", e)))
    }

    /// Checks the signature and token kind. Expiry is not checked here.
    pub fn decode(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };

        let claims = decode::<Claims>(token, &keys.decoding, &self.validation)
            .map(|token_data| token_data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, ?kind, "Token signature validation failed");
                AuthError::InvalidToken
            })?;

        if claims.typ != kind {
            tracing::debug!(expected = ?kind, actual = ?claims.typ, "Token kind mismatch");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

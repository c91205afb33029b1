//! Domain records persisted by the Credential Store.
//!
//! `Account` is the durable identity record. Its password hash never leaves
//! the core: it is redacted from `Debug` output and the type is not
//! serializable; callers get a [`PublicAccount`] view instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of login attempts kept per account for audit.
pub const LOGIN_HISTORY_LIMIT: usize = 10;

/// Account role. There is no hierarchy between roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Vendor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Vendor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("{} is not a valid role", input)),
        }
    }
}

/// One entry of the bounded login history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub source_address: String,
    pub client_descriptor: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// The lockout-relevant slice of an account. This pair is the only shared
/// mutable state in the core and is updated through compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityState {
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl SecurityState {
    /// True while `now < locked_until`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Consent captured at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsentFlags {
    pub terms_accepted: bool,
    pub privacy_policy_accepted: bool,
    #[serde(default)]
    pub marketing_consent: bool,
}

#[derive(Clone)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub login_history: Vec<LoginRecord>,
    pub terms_accepted_at: DateTime<Utc>,
    pub privacy_policy_accepted_at: DateTime<Utc>,
    pub marketing_consent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn security(&self) -> SecurityState {
        SecurityState {
            failed_login_count: self.failed_login_count,
            locked_until: self.locked_until,
        }
    }

    pub fn apply_security(&mut self, state: SecurityState) {
        self.failed_login_count = state.failed_login_count;
        self.locked_until = state.locked_until;
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.security().is_locked(now)
    }

    pub fn public_view(&self) -> PublicAccount {
        PublicAccount {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
            email_verified: self.email_verified,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("email_verified", &self.email_verified)
            .field("failed_login_count", &self.failed_login_count)
            .field("locked_until", &self.locked_until)
            .field("password_changed_at", &self.password_changed_at)
            .finish_non_exhaustive()
    }
}

/// Account fields safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccount {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A pending one-time token (password reset or email verification).
/// Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeTokenRecord {
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

//! Credential Store: persistence of accounts and their security counters.
//!
//! The auth core talks to storage only through [`AccountStore`]. Two
//! implementations are provided: [`AccountRepository`] over SQLite and
//! [`InMemoryAccountRepository`] for tests and local development.

use crate::database::models::{Account, LoginRecord, OneTimeTokenRecord, SecurityState};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod account_repository;
pub mod memory_repository;

pub use account_repository::AccountRepository;
pub use memory_repository::InMemoryAccountRepository;

/// Storage operations required by the auth core.
///
/// Emails are compared case-insensitively and stored lowercase.
/// `compare_and_set_security` and the `take_*` methods must be atomic with
/// respect to concurrent callers.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts a new account. Returns `false` when the email is already taken.
    async fn insert(&self, account: &Account) -> Result<bool>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Replaces the lockout state with `next` only if it still equals
    /// `expected`. Returns whether the swap happened.
    async fn compare_and_set_security(
        &self,
        id: &str,
        expected: SecurityState,
        next: SecurityState,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Appends to the bounded login history; a successful record also
    /// updates `last_login` and `last_login_ip`.
    async fn record_login(&self, id: &str, record: LoginRecord) -> Result<()>;

    /// Stores a new password hash, sets `password_changed_at` and drops any
    /// pending password-reset token.
    async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_password_reset(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically consumes an unexpired reset token, returning the owning
    /// account id.
    async fn take_password_reset(&self, digest: &str, now: DateTime<Utc>)
    -> Result<Option<String>>;

    async fn set_email_verification(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically consumes an unexpired verification token and marks the
    /// owning account verified, returning its id.
    async fn take_email_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>>;

    /// Activates or deactivates an account. Returns `false` if it does not exist.
    async fn set_active(&self, id: &str, active: bool, at: DateTime<Utc>) -> Result<bool>;
}

//! SQLite implementation of the Credential Store.
//!
//! Timestamps are stored as integer milliseconds. Lockout updates are a
//! single conditional `UPDATE`, so SQLite's write serialization gives the
//! compare-and-set semantics the login flow relies on.

use super::AccountStore;
use crate::database::models::{
    Account, LOGIN_HISTORY_LIMIT, LoginRecord, OneTimeTokenRecord, Role, SecurityState,
};
use crate::database::{from_millis, to_millis};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

const ACCOUNT_COLUMNS: &str = r#"
    id, name, email, password_hash, role, is_active, email_verified,
    failed_login_count, locked_until_ms, password_changed_at_ms,
    last_login_ms, last_login_ip, terms_accepted_at_ms,
    privacy_policy_accepted_at_ms, marketing_consent,
    created_at_ms, updated_at_ms
"#;

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    email_verified: bool,
    failed_login_count: i64,
    locked_until_ms: Option<i64>,
    password_changed_at_ms: i64,
    last_login_ms: Option<i64>,
    last_login_ip: Option<String>,
    terms_accepted_at_ms: i64,
    privacy_policy_accepted_at_ms: i64,
    marketing_consent: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

#[derive(Debug, FromRow)]
struct LoginRecordRow {
    source_address: String,
    client_descriptor: String,
    occurred_at_ms: i64,
    success: bool,
}

impl AccountRow {
    fn into_account(self, login_history: Vec<LoginRecord>) -> Result<Account> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(|e| anyhow!("corrupt role for account {}: {}", self.id, e))?;

        Ok(Account {
            role,
            failed_login_count: u32::try_from(self.failed_login_count)
                .context("failed_login_count out of range")?,
            locked_until: self.locked_until_ms.map(from_millis).transpose()?,
            password_changed_at: from_millis(self.password_changed_at_ms)?,
            last_login: self.last_login_ms.map(from_millis).transpose()?,
            terms_accepted_at: from_millis(self.terms_accepted_at_ms)?,
            privacy_policy_accepted_at: from_millis(self.privacy_policy_accepted_at_ms)?,
            created_at: from_millis(self.created_at_ms)?,
            updated_at: from_millis(self.updated_at_ms)?,
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            is_active: self.is_active,
            email_verified: self.email_verified,
            last_login_ip: self.last_login_ip,
            marketing_consent: self.marketing_consent,
            login_history,
        })
    }
}

/// Repository for account database operations.
#[derive(Clone)]
pub struct AccountRepository {
    /// Shared SQLite connection pool
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository instance.
    ///
    /// # Arguments
    /// * `pool` - SQLite connection pool with migrations applied
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_history(&self, account_id: &str) -> Result<Vec<LoginRecord>> {
        let rows = sqlx::query_as::<_, LoginRecordRow>(
            r#"
            SELECT source_address, client_descriptor, occurred_at_ms, success
            FROM login_history
            WHERE account_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LoginRecord {
                    source_address: row.source_address,
                    client_descriptor: row.client_descriptor,
                    timestamp: from_millis(row.occurred_at_ms)?,
                    success: row.success,
                })
            })
            .collect()
    }

    async fn hydrate(&self, row: Option<AccountRow>) -> Result<Option<Account>> {
        match row {
            Some(row) => {
                let history = self.load_history(&row.id).await?;
                Ok(Some(row.into_account(history)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn insert(&self, account: &Account) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, name, email, password_hash, role, is_active, email_verified,
                failed_login_count, locked_until_ms, password_changed_at_ms,
                last_login_ms, last_login_ip, terms_accepted_at_ms,
                privacy_policy_accepted_at_ms, marketing_consent,
                created_at_ms, updated_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(account.email.to_lowercase())
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.is_active)
        .bind(account.email_verified)
        .bind(i64::from(account.failed_login_count))
        .bind(account.locked_until.map(to_millis))
        .bind(to_millis(account.password_changed_at))
        .bind(account.last_login.map(to_millis))
        .bind(&account.last_login_ip)
        .bind(to_millis(account.terms_accepted_at))
        .bind(to_millis(account.privacy_policy_accepted_at))
        .bind(account.marketing_consent)
        .bind(to_millis(account.created_at))
        .bind(to_millis(account.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn compare_and_set_security(
        &self,
        id: &str,
        expected: SecurityState,
        next: SecurityState,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_count = ?, locked_until_ms = ?, updated_at_ms = ?
            WHERE id = ? AND failed_login_count = ? AND locked_until_ms IS ?
            "#,
        )
        .bind(i64::from(next.failed_login_count))
        .bind(next.locked_until.map(to_millis))
        .bind(to_millis(at))
        .bind(id)
        .bind(i64::from(expected.failed_login_count))
        .bind(expected.locked_until.map(to_millis))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_login(&self, id: &str, record: LoginRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO login_history
                (account_id, source_address, client_descriptor, occurred_at_ms, success)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&record.source_address)
        .bind(&record.client_descriptor)
        .bind(to_millis(record.timestamp))
        .bind(record.success)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM login_history
            WHERE account_id = ? AND id NOT IN (
                SELECT id FROM login_history WHERE account_id = ? ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(LOGIN_HISTORY_LIMIT as i64)
        .execute(&mut *tx)
        .await?;

        if record.success {
            sqlx::query(
                r#"
                UPDATE accounts
                SET last_login_ms = ?, last_login_ip = ?, updated_at_ms = ?
                WHERE id = ?
                "#,
            )
            .bind(to_millis(record.timestamp))
            .bind(&record.source_address)
            .bind(to_millis(record.timestamp))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = ?, password_changed_at_ms = ?,
                password_reset_digest = NULL, password_reset_expires_ms = NULL,
                updated_at_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(to_millis(changed_at))
        .bind(to_millis(changed_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_password_reset(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let (digest, expires) = split_token(token);
        sqlx::query(
            r#"
            UPDATE accounts
            SET password_reset_digest = ?, password_reset_expires_ms = ?, updated_at_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(digest)
        .bind(expires)
        .bind(to_millis(at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_password_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE accounts
            SET password_reset_digest = NULL, password_reset_expires_ms = NULL, updated_at_ms = ?
            WHERE password_reset_digest = ? AND password_reset_expires_ms > ?
            RETURNING id
            "#,
        )
        .bind(to_millis(now))
        .bind(digest)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn set_email_verification(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let (digest, expires) = split_token(token);
        sqlx::query(
            r#"
            UPDATE accounts
            SET email_verification_digest = ?, email_verification_expires_ms = ?, updated_at_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(digest)
        .bind(expires)
        .bind(to_millis(at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_email_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE accounts
            SET email_verified = 1,
                email_verification_digest = NULL, email_verification_expires_ms = NULL,
                updated_at_ms = ?
            WHERE email_verification_digest = ? AND email_verification_expires_ms > ?
            RETURNING id
            "#,
        )
        .bind(to_millis(now))
        .bind(digest)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn set_active(&self, id: &str, active: bool, at: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE accounts SET is_active = ?, updated_at_ms = ? WHERE id = ?")
                .bind(active)
                .bind(to_millis(at))
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn split_token(token: Option<OneTimeTokenRecord>) -> (Option<String>, Option<i64>) {
    match token {
        Some(token) => (Some(token.digest), Some(to_millis(token.expires_at))),
        None => (None, None),
    }
}

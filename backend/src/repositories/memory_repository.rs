//! In-memory Credential Store.
//!
//! Intended for tests/dev. Every operation runs under a single mutex, which
//! makes compare-and-set and token consumption trivially atomic.

use super::AccountStore;
use crate::database::models::{
    Account, LOGIN_HISTORY_LIMIT, LoginRecord, OneTimeTokenRecord, SecurityState,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct StoredAccount {
    account: Account,
    password_reset: Option<OneTimeTokenRecord>,
    email_verification: Option<OneTimeTokenRecord>,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, StoredAccount>,
    /// lowercase email -> account id
    emails: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    tables: Mutex<Tables>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| anyhow!("lock poisoned"))
    }
}

fn take_matching(
    slot: &mut Option<OneTimeTokenRecord>,
    digest: &str,
    now: DateTime<Utc>,
) -> bool {
    let matches = slot
        .as_ref()
        .is_some_and(|token| token.digest == digest && token.expires_at > now);
    if matches {
        *slot = None;
    }
    matches
}

#[async_trait]
impl AccountStore for InMemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<bool> {
        let mut tables = self.lock()?;
        let email = account.email.trim().to_lowercase();
        if tables.emails.contains_key(&email) || tables.accounts.contains_key(&account.id) {
            return Ok(false);
        }

        let mut account = account.clone();
        account.email = email.clone();
        tables.emails.insert(email, account.id.clone());
        tables.accounts.insert(
            account.id.clone(),
            StoredAccount {
                account,
                password_reset: None,
                email_verification: None,
            },
        );
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        let tables = self.lock()?;
        Ok(tables.accounts.get(id).map(|s| s.account.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let tables = self.lock()?;
        let key = email.trim().to_lowercase();
        Ok(tables
            .emails
            .get(&key)
            .and_then(|id| tables.accounts.get(id))
            .map(|s| s.account.clone()))
    }

    async fn compare_and_set_security(
        &self,
        id: &str,
        expected: SecurityState,
        next: SecurityState,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.lock()?;
        let Some(stored) = tables.accounts.get_mut(id) else {
            return Ok(false);
        };
        if stored.account.security() != expected {
            return Ok(false);
        }
        stored.account.apply_security(next);
        stored.account.updated_at = at;
        Ok(true)
    }

    async fn record_login(&self, id: &str, record: LoginRecord) -> Result<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .accounts
            .get_mut(id)
            .ok_or_else(|| anyhow!("account {} not found", id))?;
        let account = &mut stored.account;

        if record.success {
            account.last_login = Some(record.timestamp);
            account.last_login_ip = Some(record.source_address.clone());
            account.updated_at = record.timestamp;
        }
        account.login_history.push(record);
        let overflow = account
            .login_history
            .len()
            .saturating_sub(LOGIN_HISTORY_LIMIT);
        account.login_history.drain(..overflow);
        Ok(())
    }

    async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .accounts
            .get_mut(id)
            .ok_or_else(|| anyhow!("account {} not found", id))?;
        stored.account.password_hash = password_hash.to_string();
        stored.account.password_changed_at = changed_at;
        stored.account.updated_at = changed_at;
        stored.password_reset = None;
        Ok(())
    }

    async fn set_password_reset(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.lock()?;
        if let Some(stored) = tables.accounts.get_mut(id) {
            stored.password_reset = token;
            stored.account.updated_at = at;
        }
        Ok(())
    }

    async fn take_password_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut tables = self.lock()?;
        for stored in tables.accounts.values_mut() {
            if take_matching(&mut stored.password_reset, digest, now) {
                stored.account.updated_at = now;
                return Ok(Some(stored.account.id.clone()));
            }
        }
        Ok(None)
    }

    async fn set_email_verification(
        &self,
        id: &str,
        token: Option<OneTimeTokenRecord>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.lock()?;
        if let Some(stored) = tables.accounts.get_mut(id) {
            stored.email_verification = token;
            stored.account.updated_at = at;
        }
        Ok(())
    }

    async fn take_email_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut tables = self.lock()?;
        for stored in tables.accounts.values_mut() {
            if take_matching(&mut stored.email_verification, digest, now) {
                stored.account.email_verified = true;
                stored.account.updated_at = now;
                return Ok(Some(stored.account.id.clone()));
            }
        }
        Ok(None)
    }

    async fn set_active(&self, id: &str, active: bool, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.lock()?;
        match tables.accounts.get_mut(id) {
            Some(stored) => {
                stored.account.is_active = active;
                stored.account.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ConsentFlags, Role};
    use crate::test_support::sample_account;
    use chrono::Duration;

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let repo = InMemoryAccountRepository::new();
        let now = Utc::now();
        let mut account = sample_account("acc-1", Role::User, now, ConsentFlags::default());
        account.email = "Mixed@Example.COM".to_string();

        assert!(repo.insert(&account).await.unwrap());
        let found = repo.find_by_email("mixed@example.com").await.unwrap().unwrap();
        assert_eq!(found.email, "mixed@example.com");

        let mut clash = sample_account("acc-2", Role::Vendor, now, ConsentFlags::default());
        clash.email = "MIXED@example.com".to_string();
        assert!(!repo.insert(&clash).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_expectation() {
        let repo = InMemoryAccountRepository::new();
        let now = Utc::now();
        repo.insert(&sample_account("acc-1", Role::User, now, ConsentFlags::default()))
            .await
            .unwrap();

        let one = SecurityState {
            failed_login_count: 1,
            locked_until: None,
        };
        assert!(
            repo.compare_and_set_security("acc-1", SecurityState::default(), one, now)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .compare_and_set_security("acc-1", SecurityState::default(), one, now)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .compare_and_set_security("missing", SecurityState::default(), one, now)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_one_time_tokens_are_single_use() {
        let repo = InMemoryAccountRepository::new();
        let now = Utc::now();
        repo.insert(&sample_account("acc-1", Role::User, now, ConsentFlags::default()))
            .await
            .unwrap();

        let record = OneTimeTokenRecord {
            digest: "d1".to_string(),
            expires_at: now + Duration::minutes(10),
        };
        repo.set_password_reset("acc-1", Some(record), now)
            .await
            .unwrap();

        assert_eq!(repo.take_password_reset("other", now).await.unwrap(), None);
        assert_eq!(
            repo.take_password_reset("d1", now).await.unwrap().as_deref(),
            Some("acc-1")
        );
        assert_eq!(repo.take_password_reset("d1", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_password_drops_pending_reset() {
        let repo = InMemoryAccountRepository::new();
        let now = Utc::now();
        repo.insert(&sample_account("acc-1", Role::User, now, ConsentFlags::default()))
            .await
            .unwrap();
        let record = OneTimeTokenRecord {
            digest: "d1".to_string(),
            expires_at: now + Duration::minutes(10),
        };
        repo.set_password_reset("acc-1", Some(record), now)
            .await
            .unwrap();

        let later = now + Duration::seconds(1);
        repo.update_password("acc-1", "$2b$04$other", later)
            .await
            .unwrap();

        let account = repo.find_by_id("acc-1").await.unwrap().unwrap();
        assert_eq!(account.password_changed_at, later);
        assert_eq!(repo.take_password_reset("d1", later).await.unwrap(), None);
    }
}

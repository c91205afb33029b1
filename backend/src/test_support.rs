//! Shared fixtures for unit tests.

use crate::config::AuthSettings;
use crate::database::models::{Account, ConsentFlags, Role};
use crate::errors::AuthResult;
use crate::repositories::InMemoryAccountRepository;
use crate::services::auth_service::AuthService;
use crate::services::mailer::Mailer;
use crate::utils::ManualClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// An active, unlocked account with `{id}@example.com` as its email and a
/// placeholder password hash.
pub fn sample_account(id: &str, role: Role, now: DateTime<Utc>, consent: ConsentFlags) -> Account {
    Account {
        id: id.to_string(),
        name: format!("Sample {}", id),
        email: format!("{}@example.com", id),
        password_hash: "$2b$04$placeholderplaceholderplaceholderplaceholderplacehol".to_string(),
        role,
        is_active: true,
        email_verified: false,
        failed_login_count: 0,
        locked_until: None,
        password_changed_at: now,
        last_login: None,
        last_login_ip: None,
        login_history: Vec::new(),
        terms_accepted_at: now,
        privacy_policy_accepted_at: now,
        marketing_consent: consent.marketing_consent,
        created_at: now,
        updated_at: now,
    }
}

pub fn accepted_consent() -> ConsentFlags {
    ConsentFlags {
        terms_accepted: true,
        privacy_policy_accepted: true,
        marketing_consent: false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    PasswordReset { to: String, token: String },
    EmailVerification { to: String, token: String },
}

/// Captures outgoing mail so tests can read the one-time tokens.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_token(&self) -> Option<String> {
        self.sent().last().map(|mail| match mail {
            SentMail::PasswordReset { token, .. } | SentMail::EmailVerification { token, .. } => {
                token.clone()
            }
        })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset(&self, to: &str, _name: &str, token: &str) -> AuthResult<()> {
        self.sent.lock().unwrap().push(SentMail::PasswordReset {
            to: to.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_email_verification(
        &self,
        to: &str,
        _name: &str,
        token: &str,
    ) -> AuthResult<()> {
        self.sent.lock().unwrap().push(SentMail::EmailVerification {
            to: to.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

/// An [`AuthService`] over the in-memory store, a manual clock and the
/// cheapest bcrypt cost.
pub struct TestHarness {
    pub service: Arc<AuthService>,
    pub store: Arc<InMemoryAccountRepository>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn test_settings() -> AuthSettings {
    let mut settings = AuthSettings::with_secrets("test-access-secret", "test-refresh-secret");
    settings.bcrypt_cost = 4;
    settings
}

pub fn harness() -> TestHarness {
    harness_with(test_settings())
}

pub fn harness_with(settings: AuthSettings) -> TestHarness {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(InMemoryAccountRepository::new());
    let mailer = Arc::new(RecordingMailer::default());
    let service = Arc::new(
        AuthService::new(settings, store.clone(), mailer.clone(), clock.clone()).unwrap(),
    );
    TestHarness {
        service,
        store,
        clock,
        mailer,
    }
}

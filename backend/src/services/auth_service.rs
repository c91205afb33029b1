//! Core business logic for the authentication system.
//!
//! [`AuthService`] ties the Credential Store, Password Hasher, Lockout
//! Policy, Token Issuer and Session Verifier together into the operations
//! the rest of the platform calls: registration, login, refresh, the
//! `require_auth` guard, and the password/email maintenance flows.

use crate::config::AuthSettings;
use crate::database::models::{Account, ConsentFlags, LoginRecord, PublicAccount, SecurityState};
use crate::errors::{AuthError, AuthResult};
use crate::repositories::AccountStore;
use crate::services::authorization::{RoleSet, ensure_authorized};
use crate::services::lockout::{LockStatus, LockoutPolicy};
use crate::services::mailer::Mailer;
use crate::services::one_time_token::{OneTimeToken, digest};
use crate::services::password::{PasswordHasher, StrongPassword};
use crate::services::revocation::RevocationList;
use crate::services::session::SessionVerifier;
use crate::services::token::{Claims, TokenIssuer, TokenKind, TokenPair};
use crate::services::validation::{EmailAddress, NewRegistration};
use crate::utils::Clock;
use crate::utils::generate_random_string::generate_random_string;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on compare-and-set attempts for one lockout transition.
const SECURITY_UPDATE_RETRIES: usize = 16;

/// Where a login attempt came from, kept in the account's login history.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub source_address: String,
    pub client_descriptor: String,
}

impl ClientContext {
    pub fn new(source_address: impl Into<String>, client_descriptor: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            client_descriptor: client_descriptor.into(),
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub account: PublicAccount,
}

pub struct AuthService {
    store: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
    tokens: Arc<TokenIssuer>,
    sessions: SessionVerifier,
    revocations: Arc<RevocationList>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
    /// Verified against when the email is unknown, so a miss costs as much
    /// as a wrong password.
    dummy_hash: String,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(
        settings: AuthSettings,
        store: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        let hasher = PasswordHasher::new(settings.bcrypt_cost)?;
        let lockout = LockoutPolicy::new(settings.max_login_attempts, settings.lock_duration);
        let tokens = Arc::new(TokenIssuer::new(&settings, clock.clone()));
        let revocations = Arc::new(RevocationList::new());
        let sessions = SessionVerifier::new(
            store.clone(),
            tokens.clone(),
            revocations.clone(),
            clock.clone(),
        );
        let dummy_hash = hasher.hash(&generate_random_string(32))?;

        Ok(AuthService {
            store,
            hasher,
            lockout,
            tokens,
            sessions,
            revocations,
            mailer,
            clock,
            settings,
            dummy_hash,
        })
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionVerifier {
        &self.sessions
    }

    /// Creates an account after validating every field, then sends an
    /// email-verification link. A mail failure does not undo registration.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
        consent: ConsentFlags,
    ) -> AuthResult<Account> {
        let input = NewRegistration::parse(name, email, password, role, consent)?;

        if self.store.find_by_email(input.email.as_str()).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_blocking(input.password.as_str()).await?;
        let now = self.clock.now();
        let account = Account {
            id: Uuid::now_v7().to_string(),
            name: input.name.as_str().to_string(),
            email: input.email.as_str().to_string(),
            password_hash,
            role: input.role,
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
            marketing_consent: input.consent.marketing_consent,
            created_at: now,
            updated_at: now,
        };

        // The unique index decides races between concurrent registrations.
        if !self.store.insert(&account).await? {
            return Err(AuthError::DuplicateEmail);
        }

        tracing::info!(
            account_id = %account.id,
            email = %account.email,
            role = %account.role,
            "Account registered"
        );

        if let Err(e) = self.send_verification(&account).await {
            tracing::warn!(account_id = %account.id, error = %e, "Verification mail failed");
        }

        Ok(account)
    }

    /// Authenticates by email and password and issues a token pair.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> AuthResult<LoginOutcome> {
        self.login_with_roles(email, password, client, None).await
    }

    /// Login for a panel restricted to `portal` roles. Credentials are
    /// checked (and the lockout counter reset) before the role is.
    pub async fn login_to_portal(
        &self,
        portal: &RoleSet,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> AuthResult<LoginOutcome> {
        self.login_with_roles(email, password, client, Some(portal))
            .await
    }

    async fn login_with_roles(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
        portal: Option<&RoleSet>,
    ) -> AuthResult<LoginOutcome> {
        let Some(account) = self.store.find_by_email(email.trim()).await? else {
            self.hasher
                .verify_blocking(password, &self.dummy_hash)
                .await?;
            tracing::info!(reason = "unknown_email", "Login failed");
            return Err(AuthError::InvalidCredentials);
        };

        let now = self.clock.now();
        if let LockStatus::Locked { until } = self.lockout.status(&account.security(), now) {
            self.record_attempt(&account.id, client, false).await?;
            tracing::info!(account_id = %account.id, reason = "locked", "Login rejected");
            return Err(AuthError::locked(until, now));
        }

        if !account.is_active {
            self.record_attempt(&account.id, client, false).await?;
            tracing::info!(account_id = %account.id, reason = "disabled", "Login rejected");
            return Err(AuthError::AccountDisabled);
        }

        let matches = self
            .hasher
            .verify_blocking(password, &account.password_hash)
            .await?;
        let now = self.clock.now();

        if !matches {
            let state = self
                .transition_security(&account, |state| Ok(self.lockout.on_failure(state, now)))
                .await?;
            self.record_attempt(&account.id, client, false).await?;

            if !account.is_locked(now) && state.is_locked(now) {
                tracing::warn!(
                    account_id = %account.id,
                    failed_login_count = state.failed_login_count,
                    locked_until = ?state.locked_until,
                    "Account locked after repeated login failures"
                );
            } else {
                tracing::info!(
                    account_id = %account.id,
                    reason = "wrong_password",
                    "Login failed"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        // A concurrent failure may have locked the account while the hash
        // was being checked; the lock wins.
        let state = self
            .transition_security(&account, |state| match self.lockout.status(state, now) {
                LockStatus::Locked { until } => Err(AuthError::locked(until, now)),
                LockStatus::Open => Ok(self.lockout.on_success(state)),
            })
            .await?;
        self.record_attempt(&account.id, client, true).await?;

        if let Some(portal) = portal {
            ensure_authorized(&account, portal)?;
        }

        let mut account = account;
        account.apply_security(state);
        account.last_login = Some(now);
        account.last_login_ip = Some(client.source_address.clone());

        let tokens = self.tokens.issue(&account)?;
        tracing::info!(account_id = %account.id, role = %account.role, "Login succeeded");

        Ok(LoginOutcome {
            tokens,
            account: account.public_view(),
        })
    }

    /// Exchanges a refresh token for a new pair. The presented refresh token
    /// is revoked, so each one can be used once.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let session = self
            .sessions
            .verify(refresh_token, TokenKind::Refresh)
            .await?;

        self.revoke(&session.claims);
        let tokens = self.tokens.issue(&session.account)?;
        tracing::debug!(account_id = %session.account.id, "Tokens refreshed");
        Ok(tokens)
    }

    /// Guard for protected operations: a valid access token whose account
    /// holds one of `required` roles.
    pub async fn require_auth(&self, token: &str, required: &RoleSet) -> AuthResult<Account> {
        let account = self.sessions.authenticate(token).await?;
        ensure_authorized(&account, required)?;
        Ok(account)
    }

    /// Revokes the access token and, when given, the refresh token issued
    /// alongside it.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> AuthResult<()> {
        let session = self.sessions.verify(access_token, TokenKind::Access).await?;

        if let Some(refresh_token) = refresh_token {
            let refresh = self.tokens.decode(refresh_token, TokenKind::Refresh)?;
            if refresh.sub != session.claims.sub {
                return Err(AuthError::InvalidToken);
            }
            self.revoke(&refresh);
        }
        self.revoke(&session.claims);

        tracing::info!(account_id = %session.account.id, "Logged out");
        Ok(())
    }

    /// Verifies the current password, stores the new one and returns a
    /// fresh token pair. Every token issued before the change becomes stale.
    pub async fn change_password(
        &self,
        account: &Account,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<TokenPair> {
        let matches = self
            .hasher
            .verify_blocking(current_password, &account.password_hash)
            .await?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let new_password = StrongPassword::parse(new_password)?;
        if new_password.as_str() == current_password {
            return Err(AuthError::validation(
                "New password must be different from the current password",
            ));
        }

        let password_hash = self.hasher.hash_blocking(new_password.as_str()).await?;
        let now = self.clock.now();
        self.store
            .update_password(&account.id, &password_hash, now)
            .await?;

        let mut account = account.clone();
        account.password_hash = password_hash;
        account.password_changed_at = now;

        tracing::info!(account_id = %account.id, "Password changed");
        self.tokens.issue(&account)
    }

    /// Starts the reset flow. Unknown emails succeed silently.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let email = EmailAddress::parse(email)?;
        let Some(account) = self.store.find_by_email(email.as_str()).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let now = self.clock.now();
        let issued = OneTimeToken::generate(now, self.settings.password_reset_ttl);
        self.store
            .set_password_reset(&account.id, Some(issued.record), now)
            .await?;

        if let Err(e) = self
            .mailer
            .send_password_reset(&account.email, &account.name, &issued.token)
            .await
        {
            tracing::error!(account_id = %account.id, error = %e, "Password reset mail failed");
        } else {
            tracing::info!(account_id = %account.id, "Password reset requested");
        }
        Ok(())
    }

    /// Consumes a reset token, sets the new password and clears any lock.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let new_password = StrongPassword::parse(new_password)?;
        let now = self.clock.now();

        let account_id = self
            .store
            .take_password_reset(&digest(token), now)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let password_hash = self.hasher.hash_blocking(new_password.as_str()).await?;
        let now = self.clock.now();
        self.store
            .update_password(&account_id, &password_hash, now)
            .await?;

        let account = self
            .store
            .find_by_id(&account_id)
            .await?
            .ok_or(AuthError::UnknownAccount)?;
        self.transition_security(&account, |_| Ok(SecurityState::default()))
            .await?;

        tracing::info!(account_id = %account_id, "Password reset completed");
        Ok(())
    }

    /// Sends a new verification link to an unverified account.
    pub async fn resend_email_verification(&self, account: &Account) -> AuthResult<()> {
        if account.email_verified {
            return Err(AuthError::validation("Email is already verified"));
        }
        self.send_verification(account).await
    }

    /// Consumes a verification token and marks its account verified.
    pub async fn verify_email(&self, token: &str) -> AuthResult<PublicAccount> {
        let now = self.clock.now();
        let account_id = self
            .store
            .take_email_verification(&digest(token), now)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let account = self
            .store
            .find_by_id(&account_id)
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        tracing::info!(account_id = %account.id, "Email verified");
        Ok(account.public_view())
    }

    /// Administrative activation switch.
    pub async fn set_active(&self, account_id: &str, active: bool) -> AuthResult<()> {
        let found = self
            .store
            .set_active(account_id, active, self.clock.now())
            .await?;
        if !found {
            return Err(AuthError::validation(format!(
                "Account {} not found",
                account_id
            )));
        }
        tracing::info!(account_id, active, "Account activation changed");
        Ok(())
    }

    async fn send_verification(&self, account: &Account) -> AuthResult<()> {
        let now = self.clock.now();
        let issued = OneTimeToken::generate(now, self.settings.email_verification_ttl);
        self.store
            .set_email_verification(&account.id, Some(issued.record), now)
            .await?;
        self.mailer
            .send_email_verification(&account.email, &account.name, &issued.token)
            .await
    }

    async fn record_attempt(
        &self,
        account_id: &str,
        client: &ClientContext,
        success: bool,
    ) -> AuthResult<()> {
        let record = LoginRecord {
            source_address: client.source_address.clone(),
            client_descriptor: client.client_descriptor.clone(),
            timestamp: self.clock.now(),
            success,
        };
        self.store.record_login(account_id, record).await?;
        Ok(())
    }

    fn revoke(&self, claims: &Claims) {
        if let Some(expires_at) = claims.expires_at() {
            self.revocations
                .revoke(&claims.jti, expires_at, self.clock.now());
        }
    }

    /// Applies `next` to the stored lockout state with compare-and-set,
    /// re-reading and retrying when another request changed it first.
    async fn transition_security<F>(&self, account: &Account, next: F) -> AuthResult<SecurityState>
    where
        F: Fn(&SecurityState) -> AuthResult<SecurityState> + Send + Sync,
    {
        let mut expected = account.security();
        for _ in 0..SECURITY_UPDATE_RETRIES {
            let proposed = next(&expected)?;
            if proposed == expected {
                return Ok(expected);
            }
            if self
                .store
                .compare_and_set_security(&account.id, expected, proposed, self.clock.now())
                .await?
            {
                return Ok(proposed);
            }

            expected = self
                .store
                .find_by_id(&account.id)
                .await?
                .ok_or(AuthError::UnknownAccount)?
                .security();
        }

        tracing::error!(account_id = %account.id, "Lockout state update kept conflicting");
        Err(AuthError::internal("Could not update account security state"))
    }
}

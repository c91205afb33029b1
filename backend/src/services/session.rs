//! Session Verifier: from a bearer token to a live account.

use crate::database::models::Account;
use crate::errors::{AuthError, AuthResult};
use crate::repositories::AccountStore;
use crate::services::revocation::RevocationList;
use crate::services::token::{Claims, TokenIssuer, TokenKind};
use crate::utils::Clock;
use std::sync::Arc;

/// An account together with the claims that authenticated it.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub account: Account,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct SessionVerifier {
    store: Arc<dyn AccountStore>,
    tokens: Arc<TokenIssuer>,
    revocations: Arc<RevocationList>,
    clock: Arc<dyn Clock>,
}

impl SessionVerifier {
    pub fn new(
        store: Arc<dyn AccountStore>,
        tokens: Arc<TokenIssuer>,
        revocations: Arc<RevocationList>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tokens,
            revocations,
            clock,
        }
    }

    /// Accepts `token` only if every check passes, in order: signature and
    /// kind, expiry, revocation, account exists, account active, account
    /// unlocked, token issued no earlier than the last password change.
    pub async fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<VerifiedSession> {
        let claims = self.tokens.decode(token, kind)?;
        let now = self.clock.now();

        if claims.is_expired(now) {
            return Err(AuthError::ExpiredToken);
        }
        if self.revocations.is_revoked(&claims.jti, now) {
            return Err(AuthError::RevokedToken);
        }

        let account = self
            .store
            .find_by_id(claims.account_id())
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if let Some(until) = account.locked_until.filter(|until| now < *until) {
            return Err(AuthError::locked(until, now));
        }
        if claims.iat_ms < account.password_changed_at.timestamp_millis() {
            tracing::debug!(account_id = %account.id, "Token predates last password change");
            return Err(AuthError::StaleToken);
        }

        Ok(VerifiedSession { account, claims })
    }

    /// Shorthand for verifying an access token and returning the account.
    pub async fn authenticate(&self, token: &str) -> AuthResult<Account> {
        self.verify(token, TokenKind::Access)
            .await
            .map(|session| session.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSettings;
    use crate::database::models::{ConsentFlags, Role, SecurityState};
    use crate::repositories::InMemoryAccountRepository;
    use crate::test_support::sample_account;
    use crate::utils::ManualClock;
    use chrono::{DateTime, Duration};

    struct Fixture {
        store: Arc<InMemoryAccountRepository>,
        clock: Arc<ManualClock>,
        tokens: Arc<TokenIssuer>,
        revocations: Arc<RevocationList>,
        verifier: SessionVerifier,
    }

    async fn fixture() -> Fixture {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryAccountRepository::new());
        let tokens = Arc::new(TokenIssuer::new(
            &AuthSettings::with_secrets("access-secret", "refresh-secret"),
            clock.clone(),
        ));
        let revocations = Arc::new(RevocationList::new());
        let verifier = SessionVerifier::new(
            store.clone(),
            tokens.clone(),
            revocations.clone(),
            clock.clone(),
        );

        let account = sample_account("acc-1", Role::User, start, ConsentFlags::default());
        assert!(store.insert(&account).await.unwrap());

        Fixture {
            store,
            clock,
            tokens,
            revocations,
            verifier,
        }
    }

    async fn access_token(f: &Fixture) -> String {
        let account = f.store.find_by_id("acc-1").await.unwrap().unwrap();
        f.tokens.issue(&account).unwrap().access_token
    }

    #[tokio::test]
    async fn test_valid_token_within_ttl() {
        let f = fixture().await;
        let token = access_token(&f).await;

        f.clock.advance(Duration::seconds(1));
        let account = f.verifier.authenticate(&token).await.unwrap();
        assert_eq!(account.id, "acc-1");
    }

    #[tokio::test]
    async fn test_expired_after_ttl() {
        let f = fixture().await;
        let token = access_token(&f).await;

        f.clock.advance(Duration::seconds(15 * 60 + 1));
        assert!(matches!(
            f.verifier.authenticate(&token).await,
            Err(AuthError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_not_expired() {
        let f = fixture().await;
        assert!(matches!(
            f.verifier.authenticate("abc.def.ghi").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_revoked_token() {
        let f = fixture().await;
        let token = access_token(&f).await;
        let claims = f.tokens.decode(&token, TokenKind::Access).unwrap();
        f.revocations
            .revoke(&claims.jti, claims.expires_at().unwrap(), f.clock.now());

        assert!(matches!(
            f.verifier.authenticate(&token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let f = fixture().await;
        let ghost = sample_account("ghost", Role::Admin, f.clock.now(), ConsentFlags::default());
        let token = f.tokens.issue(&ghost).unwrap().access_token;

        assert!(matches!(
            f.verifier.authenticate(&token).await,
            Err(AuthError::UnknownAccount)
        ));
    }

    #[tokio::test]
    async fn test_disabled_account() {
        let f = fixture().await;
        let token = access_token(&f).await;
        f.store.set_active("acc-1", false, f.clock.now()).await.unwrap();

        assert!(matches!(
            f.verifier.authenticate(&token).await,
            Err(AuthError::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_locked_account() {
        let f = fixture().await;
        let token = access_token(&f).await;
        let locked = SecurityState {
            failed_login_count: 5,
            locked_until: Some(f.clock.now() + Duration::hours(2)),
        };
        assert!(
            f.store
                .compare_and_set_security("acc-1", SecurityState::default(), locked, f.clock.now())
                .await
                .unwrap()
        );

        match f.verifier.authenticate(&token).await {
            Err(AuthError::AccountLocked { retry_after_secs, .. }) => {
                assert_eq!(retry_after_secs, 7200)
            }
            other => panic!("expected AccountLocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_older_than_password_change_is_stale() {
        let f = fixture().await;
        let token = access_token(&f).await;

        f.clock.advance(Duration::milliseconds(1));
        f.store
            .update_password("acc-1", "$2b$04$new", f.clock.now())
            .await
            .unwrap();

        assert!(matches!(
            f.verifier.authenticate(&token).await,
            Err(AuthError::StaleToken)
        ));

        // A token minted after the change is accepted.
        let fresh = access_token(&f).await;
        assert!(f.verifier.authenticate(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_token_verified_as_refresh() {
        let f = fixture().await;
        let account = f.store.find_by_id("acc-1").await.unwrap().unwrap();
        let pair = f.tokens.issue(&account).unwrap();

        let session = f
            .verifier
            .verify(&pair.refresh_token, TokenKind::Refresh)
            .await
            .unwrap();
        assert_eq!(session.claims.typ, TokenKind::Refresh);
        assert!(matches!(
            f.verifier.authenticate(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }
}

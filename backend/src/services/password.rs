//! Password Hasher and the strong-password input type.
//!
//! Hashing uses bcrypt: the per-call salt is embedded in the output, so
//! `verify` needs nothing but the stored string, and the digest comparison
//! inside `bcrypt::verify` is constant-time. Both operations are
//! deliberately CPU-expensive; async callers go through the `*_blocking`
//! variants, which run on tokio's blocking pool.

use crate::errors::{AuthError, AuthResult};
use std::fmt;

/// Lowest and highest bcrypt cost factor accepted.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// At least one of these symbols must appear in a strong password.
pub const PASSWORD_SYMBOLS: &str = "@$!%*?&";

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// A password that passed the minimum-strength policy.
///
/// Only constructed through [`StrongPassword::parse`], so holding one is
/// proof the policy was checked at the input boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct StrongPassword(String);

impl StrongPassword {
    pub fn parse(candidate: impl Into<String>) -> AuthResult<Self> {
        let candidate = candidate.into();
        check_strength(&candidate).map_err(AuthError::validation)?;
        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StrongPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StrongPassword(<redacted>)")
    }
}

/// Minimum-strength policy: 8..=128 characters with at least one lowercase
/// letter, one uppercase letter, one digit and one of [`PASSWORD_SYMBOLS`].
pub fn check_strength(candidate: &str) -> Result<(), &'static str> {
    let len = candidate.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err("Password must be at least 8 characters long");
    }
    if len > PASSWORD_MAX_LEN {
        return Err("Password cannot exceed 128 characters");
    }

    let has_lower = candidate.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = candidate.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = candidate.chars().any(|c| c.is_ascii_digit());
    let has_symbol = candidate.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

    if has_lower && has_upper && has_digit && has_symbol {
        Ok(())
    } else {
        Err(
            "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character",
        )
    }
}

/// Salted, adaptive one-way hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> AuthResult<Self> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(AuthError::internal(format!(
                "bcrypt cost {} outside {}..={}",
                cost, MIN_COST, MAX_COST
            )));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hashes `plaintext` with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        bcrypt::hash(plaintext, self.cost)
            .map_err(|e| AuthError::internal(format!("Password hashing failed: {}", e)))
    }

    /// Checks `plaintext` against a stored hash. A malformed stored hash
    /// never verifies.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match bcrypt::verify(plaintext, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    pub async fn hash_blocking(&self, plaintext: &str) -> AuthResult<String> {
        let hasher = *self;
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::internal(format!("Hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_blocking(&self, plaintext: &str, hash: &str) -> AuthResult<bool> {
        let hasher = *self;
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("Verification task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST).unwrap()
    }

    #[test]
    fn test_hash_verifies_and_is_salted() {
        let hasher = hasher();
        let first = hasher.hash("Str0ng!Pass").unwrap();
        let second = hasher.hash("Str0ng!Pass").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("Str0ng!Pass", &first));
        assert!(hasher.verify("Str0ng!Pass", &second));
        assert!(!hasher.verify("Str0ng!Pasz", &first));
    }

    #[test]
    fn test_malformed_hash_fails_closed() {
        assert!(!hasher().verify("Str0ng!Pass", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_cost_bounds() {
        assert!(PasswordHasher::new(3).is_err());
        assert!(PasswordHasher::new(32).is_err());
        assert_eq!(PasswordHasher::new(12).unwrap().cost(), 12);
    }

    #[test]
    fn test_strength_policy() {
        assert!(StrongPassword::parse("Str0ng!Pass").is_ok());
        assert!(StrongPassword::parse("Sh0rt!").is_err());
        assert!(StrongPassword::parse("alllowercase1!").is_err());
        assert!(StrongPassword::parse("ALLUPPERCASE1!").is_err());
        assert!(StrongPassword::parse("NoDigitsHere!").is_err());
        assert!(StrongPassword::parse("NoSymbols123").is_err());
        // '#' is not in the accepted symbol set
        assert!(StrongPassword::parse("Hash#Symbol1").is_err());
        assert!(StrongPassword::parse(format!("Aa1!{}", "x".repeat(125))).is_err());
    }

    #[test]
    fn test_strong_password_debug_is_redacted() {
        let password = StrongPassword::parse("Str0ng!Pass").unwrap();
        assert_eq!(format!("{password:?}"), "StrongPassword(<redacted>)");
    }

    #[tokio::test]
    async fn test_blocking_variants_agree() {
        let hasher = hasher();
        let hash = hasher.hash_blocking("Str0ng!Pass").await.unwrap();
        assert!(hasher.verify_blocking("Str0ng!Pass", &hash).await.unwrap());
        assert!(!hasher.verify_blocking("wrong", &hash).await.unwrap());
    }
}

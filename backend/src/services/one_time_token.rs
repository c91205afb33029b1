//! Single-use tokens for password reset and email verification.
//!
//! The plaintext goes to the user; only its SHA-256 digest is stored.

use crate::database::models::OneTimeTokenRecord;
use crate::utils::generate_random_string::generate_random_hex;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct OneTimeToken {
    /// Hex token handed to the user
    pub token: String,
    pub record: OneTimeTokenRecord,
}

impl OneTimeToken {
    pub fn generate(now: DateTime<Utc>, ttl: Duration) -> Self {
        let token = generate_random_hex(TOKEN_BYTES);
        let record = OneTimeTokenRecord {
            digest: digest(&token),
            expires_at: now + ttl,
        };
        Self { token, record }
    }
}

/// Hex SHA-256 of a presented token.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let now = Utc::now();
        let issued = OneTimeToken::generate(now, Duration::minutes(10));

        assert_eq!(issued.token.len(), TOKEN_BYTES * 2);
        assert_eq!(issued.record.expires_at, now + Duration::minutes(10));
        assert_eq!(issued.record.digest, digest(&issued.token));
        assert_ne!(issued.record.digest, issued.token);
    }

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

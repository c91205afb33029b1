//! Server-side token denylist.
//!
//! Entries are keyed by the token's `jti` and live only until the token
//! would have expired anyway, so the list stays bounded by the number of
//! tokens revoked within one refresh-token lifetime.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct RevocationList {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denies `jti` until `expires_at`. Expired entries are pruned on the way.
    pub fn revoke(&self, jti: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        if expires_at <= now {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, until| *until > now);
        entries.insert(jti.to_string(), expires_at);
        tracing::debug!(denylisted = entries.len(), "Token revoked");
    }

    pub fn is_revoked(&self, jti: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(jti).is_some_and(|until| *until > now)
    }
}

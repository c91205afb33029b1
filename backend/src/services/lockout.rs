//! Lockout Policy: the per-account failed-login state machine.
//!
//! Pure functions over [`SecurityState`]; persistence and atomicity are the
//! caller's job (see `AuthService`, which applies transitions through the
//! store's compare-and-set).
//!
//! ```text
//! Open   --failure--> Open     count += 1            (count < max)
//! Open   --failure--> Locked   locked_until = now+d  (count reaches max)
//! Locked --any-----> Locked    rejected before password verification
//! expired lock --failure--> evaluated as Open with count restarting at 1
//! any    --success--> Open     count = 0, lock cleared
//! ```

use crate::database::models::SecurityState;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Open,
    Locked { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lock_duration: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lock_duration,
        }
    }

    pub fn status(&self, state: &SecurityState, now: DateTime<Utc>) -> LockStatus {
        match state.locked_until {
            Some(until) if now < until => LockStatus::Locked { until },
            _ => LockStatus::Open,
        }
    }

    /// State after a failed password check observed at `now`.
    pub fn on_failure(&self, state: &SecurityState, now: DateTime<Utc>) -> SecurityState {
        match state.locked_until {
            // Still locked (a concurrent attempt got there first): count it,
            // but never extend the lock.
            Some(until) if now < until => SecurityState {
                failed_login_count: state.failed_login_count.saturating_add(1),
                locked_until: Some(until),
            },
            // Expired lock: this attempt restarts the count at 1.
            Some(_) => self.count_failure(1, now),
            None => self.count_failure(state.failed_login_count.saturating_add(1), now),
        }
    }

    /// State after a successful password check: full reset.
    pub fn on_success(&self, _state: &SecurityState) -> SecurityState {
        SecurityState::default()
    }

    fn count_failure(&self, count: u32, now: DateTime<Utc>) -> SecurityState {
        let locked_until = (count >= self.max_attempts).then(|| now + self.lock_duration);
        SecurityState {
            failed_login_count: count,
            locked_until,
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(5, Duration::hours(2))
    }
}

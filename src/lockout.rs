//! Failure counting and temporary lockout per credential identifier.
//!
//! Store key patterns:
//! - `lockout:{kind}:fail:{identifier}`: failure counter, TTL set on the first failure only
//! - `lockout:{kind}:lock:{identifier}`: lock flag with a fixed TTL, cleared by a success
//!
//! The counter window and the lock duration are independent. The lock is set
//! only by the failure that brings the count to exactly `max_attempts`. If the
//! lock expires while the counter is still alive, later failures keep counting
//! past the threshold without locking again; a fresh lock needs the counter to
//! expire and climb back to the threshold.

use crate::storage::{SharedStore, StoreError};

/// Which credential flow a tracker guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockoutKind {
    /// Email + password login.
    Login,
    /// One-time passcode verification.
    Otp,
}

impl LockoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockoutKind::Login => "normal",
            LockoutKind::Otp => "otp",
        }
    }
}

impl std::fmt::Display for LockoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds for one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub failure_window_secs: u64,
    pub lock_secs: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            failure_window_secs: 15 * 60,
            lock_secs: 10 * 60,
        }
    }
}

/// Lock state of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Open,
    Locked { retry_after_secs: u64 },
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked { .. })
    }

    /// Whole minutes until the lock lifts, rounded up, at least one.
    pub fn retry_after_minutes(&self) -> u64 {
        match self {
            LockStatus::Open => 0,
            LockStatus::Locked { retry_after_secs } => retry_after_secs.div_ceil(60).max(1),
        }
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub attempts: i64,
    pub locked: bool,
}

#[derive(Clone)]
pub struct LockoutTracker {
    store: SharedStore,
    kind: LockoutKind,
    policy: LockoutPolicy,
}

impl LockoutTracker {
    pub fn new(store: SharedStore, kind: LockoutKind, policy: LockoutPolicy) -> Self {
        Self {
            store,
            kind,
            policy,
        }
    }

    pub fn kind(&self) -> LockoutKind {
        self.kind
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    fn fail_key(&self, identifier: &str) -> String {
        format!("lockout:{}:fail:{}", self.kind.as_str(), identifier)
    }

    fn lock_key(&self, identifier: &str) -> String {
        format!("lockout:{}:lock:{}", self.kind.as_str(), identifier)
    }

    /// Count one failed attempt, locking the identifier when the count
    /// reaches `max_attempts`.
    pub async fn record_failure(&self, identifier: &str) -> Result<FailureOutcome, StoreError> {
        let attempts = self
            .store
            .incr_with_ttl(&self.fail_key(identifier), self.policy.failure_window_secs)
            .await?;

        let locked = attempts == i64::from(self.policy.max_attempts);
        if locked {
            self.store
                .set_ex(&self.lock_key(identifier), "1", self.policy.lock_secs)
                .await?;
            tracing::warn!(
                action = "lockout",
                kind = %self.kind,
                attempts,
                lock_secs = self.policy.lock_secs,
                "Identifier locked after repeated failures"
            );
        } else {
            tracing::debug!(kind = %self.kind, attempts, "Recorded failed attempt");
        }

        Ok(FailureOutcome { attempts, locked })
    }

    /// Clear the failure counter and any lock. Idempotent.
    pub async fn record_success(&self, identifier: &str) -> Result<(), StoreError> {
        self.store.del(&self.fail_key(identifier)).await?;
        self.store.del(&self.lock_key(identifier)).await?;
        Ok(())
    }

    /// Whether the lock flag is present. Store errors propagate so callers
    /// deny rather than fall through to credential checks.
    pub async fn is_locked(&self, identifier: &str) -> Result<bool, StoreError> {
        self.store.exists(&self.lock_key(identifier)).await
    }

    /// Lock state with remaining duration.
    pub async fn status(&self, identifier: &str) -> Result<LockStatus, StoreError> {
        let lock_key = self.lock_key(identifier);
        if !self.store.exists(&lock_key).await? {
            return Ok(LockStatus::Open);
        }
        let retry_after_secs = self
            .store
            .ttl(&lock_key)
            .await?
            .unwrap_or(self.policy.lock_secs);
        Ok(LockStatus::Locked { retry_after_secs })
    }

    /// Current failure count, zero when absent.
    pub async fn attempts(&self, identifier: &str) -> Result<i64, StoreError> {
        let raw = self.store.get(&self.fail_key(identifier)).await?;
        match raw {
            None => Ok(0),
            Some(v) => v.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: self.fail_key(identifier),
                reason: format!("non-integer counter {:?}", v),
            }),
        }
    }
}

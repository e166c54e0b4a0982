//! Shared key-value store used for all cross-request state.
//!
//! Every limiter window, failure counter, lock flag and session record lives
//! behind the [`Store`] contract. Two implementations exist:
//! - [`RedisStore`]: the production backend (one multiplexed connection)
//! - [`MemoryStore`]: an in-process fake with the same semantics, for tests

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle injected into every component.
pub type SharedStore = Arc<dyn Store>;

/// Outcome of one atomic prune/count/insert cycle on a window set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Whether an entry was inserted for this request.
    pub allowed: bool,
    /// Cardinality after the cycle.
    pub count: u64,
    /// Score of the earliest remaining entry, if the set is non-empty.
    pub oldest_ms: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Unexpected value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Narrow async contract over the shared store.
///
/// Implementations must execute [`Store::slide_window`] as one indivisible
/// operation: concurrent callers on the same key never observe a partially
/// applied prune/count/insert.
#[async_trait]
pub trait Store: Send + Sync {
    /// Prune entries scored `<= window_start_ms`, insert `request_id` scored
    /// `now_ms` if fewer than `max` remain, refresh the key TTL to
    /// `window_secs + 1` and report the resulting state.
    async fn slide_window(
        &self,
        key: &str,
        now_ms: i64,
        window_start_ms: i64,
        max: u64,
        window_secs: u64,
        request_id: &str,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Increment an integer counter, creating it at 1 when absent.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Increment a counter and, when this call created it, set its TTL in
    /// the same indivisible step. Later increments leave the TTL untouched.
    async fn incr_with_ttl(&self, key: &str, secs: u64) -> Result<i64, StoreError>;

    /// Set a TTL on an existing key.
    async fn expire(&self, key: &str, secs: u64) -> Result<(), StoreError>;

    /// Set a string value with a TTL.
    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining TTL in seconds; `None` when the key is absent or has no TTL.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

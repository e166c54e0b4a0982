//! Session ids and the session registry.
//!
//! Store key pattern: `session:{id}` → user identifier, fixed TTL.
//! A session is either live (record present) or absent; there is no renewal.

use crate::storage::{SharedStore, StoreError};
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Generate a cryptographically random session id.
///
/// Returns URL-safe base64 (43 characters, no padding) from 32 random bytes,
/// so the id can travel inside a token claim unescaped.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: SharedStore,
    ttl_secs: u64,
}

impl SessionRegistry {
    pub fn new(store: SharedStore, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    fn key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    /// Record a live session for `user_id`.
    pub async fn create(&self, session_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.store
            .set_ex(&Self::key(session_id), user_id, self.ttl_secs)
            .await
    }

    /// Whether the session is live. Presence alone implies validity.
    pub async fn verify(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.exists(&Self::key(session_id)).await
    }

    /// Drop the session. Revoking an absent session is not an error.
    pub async fn revoke(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.del(&Self::key(session_id)).await?;
        Ok(())
    }

    /// User identifier bound to a live session.
    pub async fn owner(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::key(session_id)).await
    }
}

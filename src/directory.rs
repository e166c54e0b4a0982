//! Collaborators the auth core consumes but does not own: user records,
//! one-time passcode records, passcode delivery and credential hashing.
//!
//! Production deployments back [`UserDirectory`] and [`OtpLedger`] with the
//! relational store and [`OtpDelivery`] with the outbound mail queue;
//! [`MemoryDirectory`] and [`MemoryOutbox`] stand in for tests and the
//! bundled binary.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Length of generated user ids.
pub const USER_ID_LEN: usize = 12;

/// User row as seen by the auth core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub matric_no: u64,
    pub password_hash: String,
    pub is_admin: bool,
    pub soft_deleted: bool,
}

/// Public projection attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub matric_no: u64,
    pub is_admin: bool,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            matric_no: user.matric_no,
            is_admin: user.is_admin,
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub matric_no: u64,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Stored one-time passcode (hashed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub code_hash: String,
    pub expires_at: u64,
    pub used: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Hashing failed: {0}")]
    Hash(String),

    #[error("Directory backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Lookup requiring both claims to match the same record.
    async fn find_by_email_and_matric(
        &self,
        email: &str,
        matric_no: u64,
    ) -> Result<Option<UserRecord>, DirectoryError>;

    async fn insert(&self, user: NewUser) -> Result<UserRecord, DirectoryError>;
}

#[async_trait]
pub trait OtpLedger: Send + Sync {
    /// Replace the latest passcode for `user_id`.
    async fn store_otp(&self, user_id: &str, record: OtpRecord) -> Result<(), DirectoryError>;

    async fn latest_otp(&self, user_id: &str) -> Result<Option<OtpRecord>, DirectoryError>;

    async fn mark_otp_used(&self, user_id: &str) -> Result<(), DirectoryError>;
}

/// Outbound channel for freshly issued passcodes. The plaintext code leaves
/// the service only through this trait.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, user_id: &str, code: u32) -> Result<(), DirectoryError>;
}

/// Delivery used when no mail transport is wired in. The code is dropped and
/// only the fact that it was not sent is logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsentDelivery;

#[async_trait]
impl OtpDelivery for UnsentDelivery {
    async fn deliver(&self, user_id: &str, _code: u32) -> Result<(), DirectoryError> {
        tracing::warn!(
            action = "otp_not_delivered",
            user_id = %user_id,
            "No OTP transport configured"
        );
        Ok(())
    }
}

/// Records the last code sent to each user.
#[derive(Clone, Default)]
pub struct MemoryOutbox {
    sent: Arc<RwLock<HashMap<String, u32>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_code(&self, user_id: &str) -> Option<u32> {
        self.sent.read().get(user_id).copied()
    }
}

#[async_trait]
impl OtpDelivery for MemoryOutbox {
    async fn deliver(&self, user_id: &str, code: u32) -> Result<(), DirectoryError> {
        self.sent.write().insert(user_id.to_string(), code);
        Ok(())
    }
}

/// Password/passcode hashing seam.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, DirectoryError>;
    fn verify(&self, digest: &str, secret: &str) -> bool;
}

/// Argon2id with the crate's default parameters.
#[derive(Default, Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, DirectoryError> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| DirectoryError::Hash(e.to_string()))?;

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| DirectoryError::Hash(e.to_string()))
    }

    fn verify(&self, digest: &str, secret: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential digest is malformed");
                false
            }
        }
    }
}

#[derive(Default)]
struct DirectoryData {
    users: HashMap<String, UserRecord>,
    otps: HashMap<String, OtpRecord>,
}

/// In-process user and passcode directory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    data: Arc<RwLock<DirectoryData>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as soft-deleted.
    pub fn soft_delete(&self, user_id: &str) -> bool {
        match self.data.write().users.get_mut(user_id) {
            Some(user) => {
                user.soft_deleted = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self
            .data
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_email_and_matric(
        &self,
        email: &str,
        matric_no: u64,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self
            .data
            .read()
            .users
            .values()
            .find(|u| u.email == email && u.matric_no == matric_no && !u.soft_deleted)
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, DirectoryError> {
        let mut data = self.data.write();

        if data.users.values().any(|u| u.matric_no == user.matric_no) {
            return Err(DirectoryError::Conflict(
                "A user with this matriculation number already exists".to_string(),
            ));
        }
        if data.users.values().any(|u| u.email == user.email) {
            return Err(DirectoryError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }

        let record = UserRecord {
            id: nanoid::nanoid!(USER_ID_LEN),
            name: user.name,
            email: user.email,
            matric_no: user.matric_no,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            soft_deleted: false,
        };
        data.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl OtpLedger for MemoryDirectory {
    async fn store_otp(&self, user_id: &str, record: OtpRecord) -> Result<(), DirectoryError> {
        let mut data = self.data.write();
        if !data.users.contains_key(user_id) {
            return Err(DirectoryError::NotFound("User not found".to_string()));
        }
        data.otps.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn latest_otp(&self, user_id: &str) -> Result<Option<OtpRecord>, DirectoryError> {
        Ok(self.data.read().otps.get(user_id).cloned())
    }

    async fn mark_otp_used(&self, user_id: &str) -> Result<(), DirectoryError> {
        if let Some(record) = self.data.write().otps.get_mut(user_id) {
            record.used = true;
        }
        Ok(())
    }
}

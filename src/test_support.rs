//! Store and hasher doubles shared by unit tests.

use crate::auth::middleware::AppState;
use crate::config::Config;
use crate::directory::{Argon2Hasher, CredentialHasher, DirectoryError, MemoryDirectory};
use crate::storage::{MemoryStore, SharedStore, Store, StoreError, WindowSnapshot};
use async_trait::async_trait;
use axum::{body::Body, http::Request, http::StatusCode, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// State over `store`, with `directory` serving both users and passcodes.
pub fn test_state(store: SharedStore, directory: &MemoryDirectory) -> AppState {
    AppState::new(
        Config::with_defaults("redis://unused", TEST_SECRET),
        store,
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
    )
}

/// POST a JSON body and return the status with the decoded response body.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (
        status,
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
    )
}

/// Store that fails every call.
pub struct BrokenStore;

#[async_trait]
impl Store for BrokenStore {
    async fn slide_window(
        &self,
        _key: &str,
        _now_ms: i64,
        _window_start_ms: i64,
        _max: u64,
        _window_secs: u64,
        _request_id: &str,
    ) -> Result<WindowSnapshot, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn incr_with_ttl(&self, _key: &str, _secs: u64) -> Result<i64, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn expire(&self, _key: &str, _secs: u64) -> Result<(), StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _secs: u64) -> Result<(), StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn del(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Timeout(500))
    }
}

/// [`MemoryStore`] whose standalone `expire` always times out.
pub struct ExpireFailingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl Store for ExpireFailingStore {
    async fn slide_window(
        &self,
        key: &str,
        now_ms: i64,
        window_start_ms: i64,
        max: u64,
        window_secs: u64,
        request_id: &str,
    ) -> Result<WindowSnapshot, StoreError> {
        self.inner
            .slide_window(key, now_ms, window_start_ms, max, window_secs, request_id)
            .await
    }
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.inner.incr(key).await
    }
    async fn incr_with_ttl(&self, key: &str, secs: u64) -> Result<i64, StoreError> {
        self.inner.incr_with_ttl(key, secs).await
    }
    async fn expire(&self, _key: &str, _secs: u64) -> Result<(), StoreError> {
        Err(StoreError::Timeout(500))
    }
    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> Result<(), StoreError> {
        self.inner.set_ex(key, value, secs).await
    }
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.inner.ttl(key).await
    }
    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.del(key).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Argon2 hasher that counts `verify` calls.
#[derive(Default, Clone)]
pub struct CountingHasher {
    inner: Argon2Hasher,
    verifies: Arc<AtomicUsize>,
}

impl CountingHasher {
    pub fn verify_calls(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }
}

impl CredentialHasher for CountingHasher {
    fn hash(&self, secret: &str) -> Result<String, DirectoryError> {
        self.inner.hash(secret)
    }

    fn verify(&self, digest: &str, secret: &str) -> bool {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(digest, secret)
    }
}

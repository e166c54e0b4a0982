//! Sliding-window rate limiting over the shared store.
//!
//! Each (bucket, client[, route]) pair owns a sorted set of request ids scored
//! by arrival time in milliseconds. One evaluation prunes expired entries,
//! counts, and admits the request only when under the limit, all inside a
//! single store operation.
//!
//! Store failures never block traffic: the limiter logs them and answers as
//! if the client had its full quota left.

use crate::clock::{secs_to_millis, Clock, SystemClock};
use crate::storage::SharedStore;
use axum::http::HeaderMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sentinel identifier when no client address header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted for the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "fly-client-ip", "x-real-ip"];

/// Bucket name plus bounds for one limiter call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub bucket: String,
    pub max_requests: u64,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub fn new(bucket: impl Into<String>, max_requests: u64, window_secs: u64) -> Self {
        Self {
            bucket: bucket.into(),
            max_requests,
            window_secs,
        }
    }
}

/// Allow/deny decision plus quota metadata for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_count: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_in_secs: u64,
}

impl RateLimitDecision {
    /// Decision used when the store cannot be consulted.
    pub fn fail_open(max_requests: u64, window_secs: u64) -> Self {
        Self {
            allowed: true,
            current_count: 0,
            limit: max_requests,
            remaining: max_requests,
            reset_in_secs: window_secs,
        }
    }
}

#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(store: SharedStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluate one request against the window for `bucket`/`client`/`route`.
    ///
    /// `route` is `None` for the global per-client limiter; route-scoped
    /// limiters pass the request path so their counters never collide with
    /// the global one.
    pub async fn evaluate(
        &self,
        bucket: &str,
        client: &str,
        route: Option<&str>,
        max_requests: u64,
        window_secs: u64,
    ) -> RateLimitDecision {
        let key = window_key(bucket, client, route);
        let window_ms = secs_to_millis(window_secs);
        let now = self.clock.now_millis();
        let window_start = now.saturating_sub(window_ms);
        let request_id = format!("{}-{}", now, nanoid::nanoid!(10));

        let snapshot = match self
            .store
            .slide_window(
                &key,
                now,
                window_start,
                max_requests,
                window_secs,
                &request_id,
            )
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, bucket = %bucket, "Rate limiter store error, failing open");
                return RateLimitDecision::fail_open(max_requests, window_secs);
            }
        };

        let reset_in_secs = match snapshot.oldest_ms {
            Some(oldest) => {
                let until_ms = oldest.saturating_add(window_ms).saturating_sub(now);
                let secs = (until_ms as f64 / 1000.0).ceil() as i64;
                secs.max(1) as u64
            }
            None => window_secs,
        };

        RateLimitDecision {
            allowed: snapshot.allowed,
            current_count: snapshot.count,
            limit: max_requests,
            remaining: max_requests.saturating_sub(snapshot.count),
            reset_in_secs,
        }
    }

    /// Evaluate using a configured rule.
    pub async fn check(
        &self,
        rule: &RateLimitRule,
        client: &str,
        route: Option<&str>,
    ) -> RateLimitDecision {
        self.evaluate(
            &rule.bucket,
            client,
            route,
            rule.max_requests,
            rule.window_secs,
        )
        .await
    }
}

/// Store key for a window set.
pub fn window_key(bucket: &str, client: &str, route: Option<&str>) -> String {
    match route {
        Some(route) => format!("ratelimit:{}:{}:{}", bucket, client, route),
        None => format!("ratelimit:{}:{}", bucket, client),
    }
}

/// Resolve the client address from proxy headers.
///
/// Edge/platform-assigned headers win over `X-Forwarded-For`, which the
/// caller controls unless the edge strips it.
pub fn client_ip(headers: &HeaderMap) -> String {
    for name in CLIENT_IP_HEADERS {
        if let Some(value) = header_str(headers, name) {
            return value.to_string();
        }
    }

    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Non-reversible client tag for logs.
pub fn client_hash(client: &str) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    client.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

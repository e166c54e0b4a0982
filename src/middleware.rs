//! Response-wide middleware: security headers and rate limiting.

use crate::error::AppError;
use crate::limiter::{client_hash, client_ip, RateLimitDecision, RateLimitRule, SlidingWindowLimiter};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Message returned when the global limiter denies a request.
pub const GLOBAL_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Adds conservative security headers to every API response.
///
/// The API serves JSON only, so nothing here needs to admit scripts, styles
/// or frames.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}

/// Whether a limiter counts per client or per client and route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// One window per client across every route.
    Global,
    /// One window per client for the request path.
    Route,
}

/// State for one rate-limiting layer.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: SlidingWindowLimiter,
    pub rule: RateLimitRule,
    pub scope: LimitScope,
}

impl RateLimitGate {
    pub fn global(limiter: SlidingWindowLimiter, rule: RateLimitRule) -> Self {
        Self {
            limiter,
            rule,
            scope: LimitScope::Global,
        }
    }

    pub fn route(limiter: SlidingWindowLimiter, rule: RateLimitRule) -> Self {
        Self {
            limiter,
            rule,
            scope: LimitScope::Route,
        }
    }
}

/// Rate-limiting middleware.
///
/// Quota headers are attached whether the request is admitted or denied.
pub async fn rate_limit(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(request.headers());
    let route = match gate.scope {
        LimitScope::Global => None,
        LimitScope::Route => Some(request.uri().path().to_string()),
    };

    let decision = gate
        .limiter
        .check(&gate.rule, &client, route.as_deref())
        .await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            action = "rate_limited",
            bucket = %gate.rule.bucket,
            route = route.as_deref().unwrap_or("*"),
            client_hash = %client_hash(&client),
            count = decision.current_count,
            "Rate limit exceeded"
        );
        match gate.scope {
            LimitScope::Global => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "message": GLOBAL_LIMIT_MESSAGE, "status": 429 })),
            )
                .into_response(),
            LimitScope::Route => AppError::RateLimited.into_response(),
        }
    };

    apply_quota_headers(response.headers_mut(), &decision);
    response
}

/// Write `X-RateLimit-*` and `Retry-After` for a decision.
///
/// Headers already present are kept: an inner route-scoped limiter reports
/// the tighter quota, and the outer global layer must not overwrite it.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        ("x-ratelimit-limit", decision.limit),
        ("x-ratelimit-remaining", decision.remaining),
        ("x-ratelimit-reset", decision.reset_in_secs),
        ("retry-after", decision.reset_in_secs),
    ];
    for (name, value) in values {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert_with(|| HeaderValue::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryStore, SharedStore};
    use axum::{body::Body, http::Request, middleware, response::IntoResponse, Router};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_handler() -> impl IntoResponse {
        (StatusCode::OK, "test response")
    }

    fn limiter(clock: Arc<ManualClock>) -> SlidingWindowLimiter {
        let store: SharedStore = Arc::new(MemoryStore::with_clock(clock.clone()));
        SlidingWindowLimiter::with_clock(store, clock)
    }

    fn limited_app(gate: RateLimitGate) -> Router {
        Router::new()
            .route("/a", axum::routing::get(test_handler))
            .route("/b", axum::routing::get(test_handler))
            .layer(middleware::from_fn_with_state(gate, rate_limit))
    }

    async fn hit(app: &Router, path: &str, ip: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .header("x-real-ip", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let app = Router::new()
            .route("/", axum::routing::get(test_handler))
            .layer(middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert!(headers
            .get("content-security-policy")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("default-src 'none'"));
    }

    #[tokio::test]
    async fn test_quota_headers_on_allowed_response() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let app = limited_app(RateLimitGate::route(
            limiter(clock),
            RateLimitRule::new("login", 5, 60),
        ));

        let response = hit(&app, "/a", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "4");
        assert_eq!(response.headers().get("x-ratelimit-reset").unwrap(), "60");
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
    }

    #[tokio::test]
    async fn test_route_scope_denial_shape() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let app = limited_app(RateLimitGate::route(
            limiter(clock.clone()),
            RateLimitRule::new("login", 2, 60),
        ));

        for _ in 0..2 {
            assert_eq!(hit(&app, "/a", "10.0.0.1").await.status(), StatusCode::OK);
            clock.advance(Duration::from_secs(1));
        }

        let denied = hit(&app, "/a", "10.0.0.1").await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers().get("x-ratelimit-remaining").unwrap(), "0");
        // Oldest entry arrived 2s ago, so it leaves the window in 58s.
        assert_eq!(denied.headers().get("retry-after").unwrap(), "58");
        assert_eq!(json_body(denied).await["message"], "Too Many Requests");

        // Other routes and other clients keep their own windows.
        assert_eq!(hit(&app, "/b", "10.0.0.1").await.status(), StatusCode::OK);
        assert_eq!(hit(&app, "/a", "10.0.0.2").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_global_scope_denial_shape() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let app = limited_app(RateLimitGate::global(
            limiter(clock.clone()),
            RateLimitRule::new("global", 1, 60),
        ));

        assert_eq!(hit(&app, "/a", "10.0.0.1").await.status(), StatusCode::OK);
        // Global windows span routes.
        let denied = hit(&app, "/b", "10.0.0.1").await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(denied.headers().contains_key("retry-after"));

        let body = json_body(denied).await;
        assert_eq!(body["message"], GLOBAL_LIMIT_MESSAGE);
        assert_eq!(body["status"], 429);

        clock.advance(Duration::from_secs(61));
        assert_eq!(hit(&app, "/b", "10.0.0.1").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inner_route_headers_win_over_global() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let limiter = limiter(clock);
        let app = Router::new()
            .route("/a", axum::routing::get(test_handler))
            .route_layer(middleware::from_fn_with_state(
                RateLimitGate::route(limiter.clone(), RateLimitRule::new("login", 5, 60)),
                rate_limit,
            ))
            .layer(middleware::from_fn_with_state(
                RateLimitGate::global(limiter, RateLimitRule::new("global", 100, 60)),
                rate_limit,
            ));

        let response = hit(&app, "/a", "10.0.0.1").await;
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "4");
    }
}

//! API route handlers.

pub mod admin;
pub mod auth;
pub mod otp;

use crate::auth::middleware::{authenticate, Access, AppState, AuthGate};
use crate::error::AppError;
use crate::middleware::{rate_limit, RateLimitGate};
use crate::models::HealthStatus;
use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

/// Check an id against the length and URL-safe alphabet that `nanoid!` emits.
pub fn validate_id(id: &str, label: &str, expected_len: usize) -> Result<(), AppError> {
    if id.len() != expected_len
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::BadRequest(format!("Invalid {} format", label)));
    }
    Ok(())
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "ok",
                store: "up",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "degraded",
                    store: "down",
                }),
            )
        }
    }
}

/// Build the API router with all endpoints under `/api/v1`.
///
/// The global limiter wraps everything; signup and login carry their own
/// route-scoped limiters on top.
pub fn api_router(state: AppState) -> Router {
    let limiter = state.limiter.clone();
    let config = state.config.clone();

    let signup = Router::new()
        .route("/users/signup", post(auth::signup))
        .route_layer(from_fn_with_state(
            RateLimitGate::route(limiter.clone(), config.signup_rule()),
            rate_limit,
        ));

    let login = Router::new()
        .route("/users/login", post(auth::login))
        .route_layer(from_fn_with_state(
            RateLimitGate::route(limiter.clone(), config.login_rule()),
            rate_limit,
        ));

    let users = Router::new()
        .route("/users/logout", post(auth::logout))
        .route("/users/profile", get(auth::profile))
        .route_layer(from_fn_with_state(
            AuthGate::new(state.clone(), Access::User),
            authenticate,
        ));

    let admin = Router::new()
        .route("/admin/ping", get(admin::ping))
        .route_layer(from_fn_with_state(
            AuthGate::new(state.clone(), Access::Admin),
            authenticate,
        ));

    let open = Router::new()
        .route("/users/otp/create/{user_id}", post(otp::create_otp))
        .route("/users/otp/verify/{user_id}", post(otp::verify_otp))
        .route("/health", get(health));

    Router::new()
        .nest(
            "/api/v1",
            signup.merge(login).merge(users).merge(admin).merge(open),
        )
        .layer(from_fn_with_state(
            RateLimitGate::global(limiter, config.global_rule()),
            rate_limit,
        ))
        .with_state(state)
}

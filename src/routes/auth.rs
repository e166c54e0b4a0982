//! Account endpoints: signup, login, logout, profile.

use crate::auth::middleware::{AppState, Identity};
use crate::auth::session::generate_session_id;
use crate::directory::{NewUser, UserProfile};
use crate::error::AppError;
use crate::limiter::client_hash;
use crate::lockout::LockStatus;
use crate::models::{ApiResponse, LoginData, LoginRequest, SignupRequest, UserData};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use zeroize::Zeroizing;

/// Returned for unknown accounts and wrong passwords alike.
pub const WRONG_CREDENTIALS: &str = "Wrong email/password combination";

fn wrong_credentials() -> AppError {
    AppError::NotFound(WRONG_CREDENTIALS.to_string())
}

/// POST /api/v1/users/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let password = Zeroizing::new(req.password);

    let password_hash = state.hasher.hash(&password)?;
    let user = state
        .users
        .insert(NewUser {
            name: req.name.trim().to_string(),
            email: req.email,
            matric_no: req.matric_no,
            password_hash,
            is_admin: false,
        })
        .await?;

    tracing::info!(action = "user_registered", user_id = %user.id, "User created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data(
            201,
            "User successfully signed up",
            UserData {
                user: UserProfile::from(&user),
            },
        )),
    ))
}

/// POST /api/v1/users/login
///
/// The lock is consulted before the password is checked, so a locked
/// account is refused even when the password is right.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let password = Zeroizing::new(req.password);

    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .filter(|u| !u.soft_deleted)
        .ok_or_else(wrong_credentials)?;

    let status = state.login_lockout.status(&req.email).await?;
    if let LockStatus::Locked { .. } = status {
        tracing::warn!(
            action = "login_locked",
            account = %client_hash(&req.email),
            "Login refused for locked account"
        );
        return Err(AppError::Locked {
            minutes: status.retry_after_minutes(),
        });
    }

    if !state.hasher.verify(&user.password_hash, &password) {
        let outcome = state.login_lockout.record_failure(&req.email).await?;
        tracing::warn!(
            action = "auth_failed",
            account = %client_hash(&req.email),
            attempts = outcome.attempts,
            locked = outcome.locked,
            "Wrong password"
        );
        return Err(wrong_credentials());
    }

    state.login_lockout.record_success(&req.email).await?;

    let session_id = generate_session_id();
    state
        .sessions
        .create(&session_id, &user.matric_no.to_string())
        .await?;
    let token = state.tokens.issue(&user.email, user.matric_no, &session_id)?;

    tracing::info!(action = "auth_success", user_id = %user.id, "User logged in");

    Ok(Json(ApiResponse::with_data(
        200,
        "User logged in successfully!",
        LoginData {
            user: UserProfile::from(&user),
            token,
        },
    )))
}

/// POST /api/v1/users/logout
pub async fn logout(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.revoke(&identity.session_id).await?;

    tracing::info!(action = "logout", user_id = %identity.user.id, "User logged out");

    Ok(Json(ApiResponse::message(200, "User logged out successfully!")))
}

/// GET /api/v1/users/profile
pub async fn profile(identity: Identity) -> impl IntoResponse {
    Json(ApiResponse::with_data(
        200,
        "User fetched successfully!",
        UserData {
            user: identity.user,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemoryDirectory, UserDirectory};
    use crate::storage::{MemoryStore, SharedStore};
    use crate::test_support::{post_json, test_state, BrokenStore, CountingHasher};
    use axum::{routing::post, Router};
    use serde_json::json;
    use std::sync::Arc;

    async fn login_app(store: SharedStore) -> (Router, CountingHasher) {
        let dir = MemoryDirectory::new();
        dir.insert(NewUser {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            matric_no: 1_900_000_001,
            password_hash: "unused".to_string(),
            is_admin: false,
        })
        .await
        .unwrap();
        let hasher = CountingHasher::default();
        let state = test_state(store, &dir).with_hasher(Arc::new(hasher.clone()));
        let app = Router::new()
            .route("/login", post(login))
            .with_state(state);
        (app, hasher)
    }

    #[tokio::test]
    async fn test_login_lock_check_error_is_500_before_password_check() {
        let (app, hasher) = login_app(Arc::new(BrokenStore)).await;
        let (status, body) = post_json(
            app,
            "/login",
            json!({ "email": "ada@example.com", "password": "correct-horse" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(hasher.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_login_open_account_reaches_password_check() {
        let (app, hasher) = login_app(Arc::new(MemoryStore::new())).await;
        let (status, body) = post_json(
            app,
            "/login",
            json!({ "email": "ada@example.com", "password": "correct-horse" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], WRONG_CREDENTIALS);
        assert_eq!(hasher.verify_calls(), 1);
    }
}

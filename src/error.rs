//! Error types and Axum response conversions.

use crate::auth::verify::TokenError;
use crate::directory::DirectoryError;
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Generic message for every authentication failure.
pub const PLEASE_AUTHENTICATE: &str = "Please authenticate";

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Account locked for {minutes} minutes")]
    Locked { minutes: u64 },

    #[error("Tries exceeded")]
    TriesExceeded,

    #[error("Rate limited")]
    RateLimited,
}

impl AppError {
    pub fn unauthenticated() -> Self {
        AppError::Unauthorized(PLEASE_AUTHENTICATE.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Locked { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TriesExceeded | AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                json!({ "error": "Internal server error" })
            }
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unprocessable(msg) => json!({ "error": msg }),
            AppError::Forbidden => json!({ "error": "Forbidden" }),
            AppError::Locked { minutes } => json!({
                "error": format!("Account locked. Try again in {} minutes", minutes)
            }),
            AppError::TriesExceeded => json!({ "error": "Tries exceeded. Request a new OTP" }),
            AppError::RateLimited => json!({ "message": "Too Many Requests" }),
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Store error: {}", err))
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::Internal(format!("Token signing: {}", msg)),
            TokenError::Expired | TokenError::Invalid(_) => AppError::unauthenticated(),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Conflict(msg) => AppError::Conflict(msg),
            DirectoryError::NotFound(msg) => AppError::NotFound(msg),
            DirectoryError::Hash(msg) | DirectoryError::Backend(msg) => {
                AppError::Internal(format!("Directory error: {}", msg))
            }
        }
    }
}

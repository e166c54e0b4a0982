//! Admin-only endpoints.

use crate::auth::middleware::Identity;
use crate::models::{ApiResponse, UserData};
use axum::{response::IntoResponse, Json};

/// GET /api/v1/admin/ping
pub async fn ping(identity: Identity) -> impl IntoResponse {
    tracing::info!(action = "admin_ping", user_id = %identity.user.id, "Admin ping");

    Json(ApiResponse::with_data(
        200,
        "Admin access granted",
        UserData {
            user: identity.user,
        },
    ))
}

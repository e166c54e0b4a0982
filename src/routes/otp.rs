//! One-time passcode issue and verification.

use super::validate_id;
use crate::auth::middleware::AppState;
use crate::directory::{OtpRecord, USER_ID_LEN};
use crate::error::AppError;
use crate::models::{ApiResponse, OtpResult, VerifyOtpRequest};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use rand::Rng;

fn generate_code() -> u32 {
    rand::rng().random_range(100_000..1_000_000)
}

/// POST /api/v1/users/otp/create/{user_id}
///
/// Only the hash is stored; the plaintext code goes to the configured
/// [`OtpDelivery`](crate::directory::OtpDelivery) and nowhere else.
pub async fn create_otp(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_id(&user_id, "user id", USER_ID_LEN)?;

    let code = generate_code();
    let record = OtpRecord {
        code_hash: state.hasher.hash(&code.to_string())?,
        expires_at: state.now_secs() + state.config.otp_ttl_secs,
        used: false,
    };
    state.otps.store_otp(&user_id, record).await?;
    state.delivery.deliver(&user_id, code).await?;

    tracing::info!(action = "otp_issued", user_id = %user_id, "OTP issued");

    Ok(Json(ApiResponse::message(200, "OTP successfully sent")))
}

/// POST /api/v1/users/otp/verify/{user_id}
pub async fn verify_otp(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_id(&user_id, "user id", USER_ID_LEN)?;

    if state.otp_lockout.is_locked(&user_id).await? {
        tracing::warn!(action = "otp_locked", user_id = %user_id, "OTP verification refused");
        return Err(AppError::TriesExceeded);
    }

    let Some(latest) = state.otps.latest_otp(&user_id).await? else {
        return Ok(Json(ApiResponse::with_data(
            200,
            "No OTP issued",
            OtpResult { result: false },
        )));
    };

    if state.now_secs() > latest.expires_at {
        return Err(AppError::Unprocessable("OTP expired".to_string()));
    }
    if latest.used {
        return Err(AppError::Unprocessable("OTP used".to_string()));
    }

    if !state.hasher.verify(&latest.code_hash, &req.otp.to_string()) {
        let outcome = state.otp_lockout.record_failure(&user_id).await?;
        tracing::warn!(
            action = "otp_failed",
            user_id = %user_id,
            attempts = outcome.attempts,
            locked = outcome.locked,
            "OTP mismatch"
        );
        return Err(AppError::Unauthorized(
            "OTP verification failed".to_string(),
        ));
    }

    state.otps.mark_otp_used(&user_id).await?;
    state.otp_lockout.record_success(&user_id).await?;

    tracing::info!(action = "otp_verified", user_id = %user_id, "OTP verified");

    Ok(Json(ApiResponse::with_data(
        200,
        "OTP verification successful",
        OtpResult { result: true },
    )))
}

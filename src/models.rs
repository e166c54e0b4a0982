//! Request and response models for the API.

use crate::directory::UserProfile;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Minimum password length accepted at signup and login.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Smallest matriculation number accepted at signup.
pub const MIN_MATRIC_NO: u64 = 10;

// ============================================================================
// Envelope
// ============================================================================

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_data(status: u16, message: impl Into<String>, data: T) -> Self {
        Self {
            status,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }
}

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub matric_no: u64,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Full name is required".to_string()));
        }
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.matric_no < MIN_MATRIC_NO {
            return Err(AppError::BadRequest(
                "Matric No must be at least 10".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub user: UserProfile,
    pub token: String,
}

// ============================================================================
// OTP Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: u32,
}

#[derive(Debug, Serialize)]
pub struct OtpResult {
    pub result: bool,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub store: &'static str,
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str, password: &str, matric_no: u64) -> SignupRequest {
        SignupRequest {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            matric_no,
        }
    }

    #[test]
    fn test_signup_request_camel_case() {
        let req: SignupRequest = serde_json::from_str(
            r#"{"name":"Ada","email":"ada@example.com","password":"longenough","matricNo":190401}"#,
        )
        .unwrap();
        assert_eq!(req.matric_no, 190401);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_signup_validation() {
        assert!(signup("ada@example.com", "short", 190401).validate().is_err());
        assert!(signup("not-an-email", "longenough", 190401).validate().is_err());
        assert!(signup("ada@example", "longenough", 190401).validate().is_err());
        assert!(signup("ada@example.com", "longenough", 9).validate().is_err());

        let mut nameless = signup("ada@example.com", "longenough", 190401);
        nameless.name = "   ".to_string();
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn test_envelope_omits_missing_data() {
        let json = serde_json::to_value(ApiResponse::message(200, "ok")).unwrap();
        assert_eq!(json["status"], 200);
        assert!(json.get("data").is_none());

        let json = serde_json::to_value(ApiResponse::with_data(
            200,
            "ok",
            OtpResult { result: true },
        ))
        .unwrap();
        assert_eq!(json["data"]["result"], true);
    }
}

//! Authentication models for the OTP login flow

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::UserResponse;

/// Authentication session recorded for an issued token
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub jti: String,
    /// sha256 hex of the issued token; the token itself is never stored
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to send a one-time passcode
#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(email)]
    pub email: String,
}

/// Request to verify a one-time passcode
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub code: String,
}

/// Outcome of an OTP send request
#[derive(Debug, Serialize, Clone)]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
    /// Seconds until sending is allowed again, present only when throttled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl SendOtpResponse {
    /// The one response shape every accepted request gets, whether or not
    /// the email maps to an account.
    pub fn accepted() -> Self {
        Self {
            success: true,
            message: "If an account exists for this email, a verification code has been sent."
                .to_string(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            success: false,
            message: "Too many verification requests. Try again later.".to_string(),
            retry_after: Some(retry_after),
        }
    }
}

/// Outcome of an OTP verification attempt
#[derive(Debug, Serialize, Clone)]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_left: Option<i32>,
}

impl VerifyOtpResponse {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
            token: None,
            attempts_left: None,
        }
    }

    pub fn wrong_code(attempts_left: i32) -> Self {
        Self {
            success: false,
            message: format!(
                "Invalid verification code. {} attempts remaining.",
                attempts_left
            ),
            user: None,
            token: None,
            attempts_left: Some(attempts_left),
        }
    }

    pub fn verified(user: UserResponse, token: String) -> Self {
        Self {
            success: true,
            message: "Verification successful.".to_string(),
            user: Some(user),
            token: Some(token),
            attempts_left: None,
        }
    }
}

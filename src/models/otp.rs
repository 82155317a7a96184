//! One-time passcode model

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// A one-time passcode issued to an email address
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct OtpCode {
    pub id: Uuid,
    pub email: String,
    /// 6-digit zero-padded numeric code
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OtpCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_locked(&self, max_attempts: i32) -> bool {
        self.attempts >= max_attempts
    }
}

//! OTP issuance and verification
//!
//! One live code per email. Sending is throttled per email; verification
//! caps wrong guesses and treats the code as single-use. A successful
//! verification doubles as email confirmation and ends with a session
//! token.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::jwt::{self, JwtError};
use crate::clock::Clock;
use crate::mailer::{MailError, OtpMailer};
use crate::models::{AuthSession, OtpCode, SendOtpResponse, User, VerifyOtpResponse};
use crate::ports::{OtpStore, SessionStore, StoreError, UserStore};

use super::rate_limiter::RateLimiter;

/// Wrong guesses allowed before a code locks.
pub const MAX_ATTEMPTS: i32 = 3;
/// Sends allowed per email per rolling hour.
pub const MAX_REQUESTS_PER_HOUR: u32 = 5;
/// Minutes a code stays valid after issuance.
pub const VALIDITY_MINUTES: i64 = 10;

const RATE_WINDOW_SECONDS: u64 = 3600;

const MSG_INVALID: &str = "Invalid verification code.";
const MSG_EXPIRED: &str = "This verification code has expired. Request a new one.";
const MSG_MAX_ATTEMPTS: &str = "Maximum verification attempts reached. Request a new code.";

/// OTP protocol errors (hard failures only; expected outcomes such as a
/// wrong code or an exhausted rate budget are response values)
#[derive(Error, Debug)]
pub enum OtpError {
    #[error("failed to dispatch verification code: {0}")]
    Dispatch(#[source] MailError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] JwtError),
}

/// Tunables for the OTP protocol
#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub validity_minutes: i64,
    pub max_attempts: i32,
    pub max_sends_per_hour: u32,
    pub jwt_secret: String,
    pub session_ttl_seconds: i64,
}

impl OtpConfig {
    pub fn new(jwt_secret: String, session_ttl_seconds: i64) -> Self {
        Self {
            validity_minutes: VALIDITY_MINUTES,
            max_attempts: MAX_ATTEMPTS,
            max_sends_per_hour: MAX_REQUESTS_PER_HOUR,
            jwt_secret,
            session_ttl_seconds,
        }
    }
}

/// OTP authentication service
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    mailer: Arc<dyn OtpMailer>,
    limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        mailer: Arc<dyn OtpMailer>,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            users,
            sessions,
            mailer,
            limiter,
            clock,
            config,
        }
    }

    /// Issue a fresh code and dispatch it by email.
    ///
    /// Unknown emails get the same response as real sends so the endpoint
    /// cannot be used to probe for accounts. The rate-limit counter is
    /// only charged after a successful dispatch.
    pub async fn send_otp(&self, email: &str) -> Result<SendOtpResponse, OtpError> {
        let key = rate_limit_key(email);
        if self
            .limiter
            .too_many_attempts(&key, self.config.max_sends_per_hour)
            .await
        {
            let retry_after = self.limiter.available_in(&key).await;
            tracing::warn!(email, retry_after, "otp send throttled");
            return Ok(SendOtpResponse::rate_limited(retry_after));
        }

        let Some(user) = self.users.find_by_email(email).await? else {
            tracing::debug!(email, "otp requested for unknown email");
            return Ok(SendOtpResponse::accepted());
        };

        let now = self.clock.now();
        let code = generate_code();
        let otp = OtpCode {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            code: code.clone(),
            expires_at: now + Duration::minutes(self.config.validity_minutes),
            attempts: 0,
            created_at: now,
        };
        self.store.replace_for_email(&otp).await?;

        self.mailer
            .send_otp(&user.email, &user.name, &code)
            .await
            .map_err(|e| {
                tracing::error!(email, error = %e, "otp dispatch failed");
                OtpError::Dispatch(e)
            })?;

        self.limiter.hit(&key, RATE_WINDOW_SECONDS).await;

        // Audit trail: the only place a code is ever logged.
        tracing::info!(email, code = %code, "otp issued");

        Ok(SendOtpResponse::accepted())
    }

    /// Verify a submitted code.
    ///
    /// An exhausted code stays locked even for the correct guess; expiry
    /// and lock checks never charge the attempt counter. Success consumes
    /// every code for the email, confirms the address, and issues a
    /// session token.
    pub async fn verify_otp(
        &self,
        email: &str,
        code: &str,
    ) -> Result<VerifyOtpResponse, OtpError> {
        let now = self.clock.now();

        let Some(record) = self.store.latest_for_email(email).await? else {
            return Ok(VerifyOtpResponse::rejected(MSG_INVALID));
        };

        if record.is_locked(self.config.max_attempts) {
            return Ok(VerifyOtpResponse::rejected(MSG_MAX_ATTEMPTS));
        }

        if record.is_expired(now) {
            return Ok(VerifyOtpResponse::rejected(MSG_EXPIRED));
        }

        if record.code != code {
            let attempts = self
                .store
                .register_failed_attempt(record.id, self.config.max_attempts)
                .await?;
            let attempts_left = (self.config.max_attempts - attempts).max(0);
            tracing::debug!(email, attempts_left, "otp verification failed");
            return Ok(VerifyOtpResponse::wrong_code(attempts_left));
        }

        // One-shot consumption: a zero count means a concurrent
        // verification already claimed this code.
        if self.store.consume(email).await? == 0 {
            return Ok(VerifyOtpResponse::rejected(MSG_INVALID));
        }

        let Some(mut user) = self.users.find_by_email(email).await? else {
            return Ok(VerifyOtpResponse::rejected(MSG_INVALID));
        };

        if user.email_verified_at.is_none() {
            self.users.mark_email_verified(user.id, now).await?;
            user.email_verified_at = Some(now);
        }

        let token = self.issue_session(&user).await?;

        tracing::info!(email, user_id = %user.id, "otp verified, session issued");

        Ok(VerifyOtpResponse::verified(user.into(), token))
    }

    /// Remove expired and attempt-exhausted codes. Idempotent.
    pub async fn cleanup_expired(&self) -> Result<u64, OtpError> {
        let removed = self
            .store
            .purge_stale(self.clock.now(), self.config.max_attempts)
            .await?;
        if removed > 0 {
            tracing::info!(removed, "stale otp codes purged");
        }
        Ok(removed)
    }

    async fn issue_session(&self, user: &User) -> Result<String, OtpError> {
        let now = self.clock.now();
        let jti = Uuid::new_v4().to_string();
        let token = jwt::generate_session_token(
            user,
            &jti,
            &self.config.jwt_secret,
            self.config.session_ttl_seconds,
            now,
        )?;

        let session = AuthSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            jti,
            token_hash: jwt::hash_token(&token),
            expires_at: now + Duration::seconds(self.config.session_ttl_seconds),
            created_at: now,
        };
        self.sessions.create_session(&session).await?;

        Ok(token)
    }
}

fn rate_limit_key(email: &str) -> String {
    format!("otp-request:{}", email.to_ascii_lowercase())
}

/// Fresh 6-digit zero-padded numeric code.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

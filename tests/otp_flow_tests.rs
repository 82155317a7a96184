//! OTP authentication protocol tests
//!
//! The full send/verify/cleanup state machine over the in-memory store,
//! with a manual clock for expiry and rate-limit windows and a recording
//! mailer standing in for the delivery API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use solarvest_core::adapters::MemoryStore;
use solarvest_core::auth::jwt;
use solarvest_core::clock::{Clock, ManualClock};
use solarvest_core::mailer::{MailError, OtpMailer};
use solarvest_core::models::{User, UserRole};
use solarvest_core::otp::{FixedWindowLimiter, OtpConfig, OtpError, OtpService};

const EMAIL: &str = "investor@example.com";
const SECRET: &str = "test-secret";

/// Mailer double that records outgoing codes instead of delivering them.
#[derive(Default)]
struct RecordingMailer {
    sent: tokio::sync::Mutex<Vec<(String, String, String)>>,
    fail_next: AtomicBool,
}

impl RecordingMailer {
    async fn last_code(&self) -> Option<String> {
        self.sent.lock().await.last().map(|(_, _, code)| code.clone())
    }

    async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_otp(&self, to: &str, name: &str, code: &str) -> Result<(), MailError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MailError::Transport("mail relay unavailable".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((to.to_string(), name.to_string(), code.to_string()));
        Ok(())
    }
}

struct Harness {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    mailer: Arc<RecordingMailer>,
    service: OtpService,
}

async fn harness() -> Harness {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mailer = Arc::new(RecordingMailer::default());
    let limiter = Arc::new(FixedWindowLimiter::new(clock.clone()));

    let now = clock.now();
    store
        .insert_user(User {
            id: Uuid::new_v4(),
            email: EMAIL.to_string(),
            name: "Asha Investor".to_string(),
            role: UserRole::Investor,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        })
        .await;

    let service = OtpService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        mailer.clone(),
        limiter,
        clock.clone(),
        OtpConfig::new(SECRET.to_string(), 900),
    );

    Harness {
        store,
        clock,
        mailer,
        service,
    }
}

/// A code guaranteed not to match the issued one.
fn wrong(code: &str) -> &'static str {
    if code == "111111" {
        "222222"
    } else {
        "111111"
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn send_and_verify_issues_a_session() {
    let h = harness().await;

    let sent = h.service.send_otp(EMAIL).await.unwrap();
    assert!(sent.success);
    assert_eq!(h.store.otp_codes().await.len(), 1);

    let code = h.mailer.last_code().await.unwrap();
    let verified = h.service.verify_otp(EMAIL, &code).await.unwrap();
    assert!(verified.success, "{}", verified.message);

    // Verification doubles as email confirmation.
    let user = verified.user.unwrap();
    assert!(user.email_verified);

    // The token decodes against the issuing secret and names the user.
    let claims = jwt::verify_token(&verified.token.unwrap(), SECRET).unwrap();
    assert_eq!(claims.email, EMAIL);
    assert_eq!(claims.sub, user.id.to_string());

    // One session recorded, all codes consumed.
    assert_eq!(h.store.sessions().await.len(), 1);
    assert!(h.store.otp_codes().await.is_empty());
}

#[tokio::test]
async fn a_consumed_code_cannot_be_replayed() {
    let h = harness().await;

    h.service.send_otp(EMAIL).await.unwrap();
    let code = h.mailer.last_code().await.unwrap();

    assert!(h.service.verify_otp(EMAIL, &code).await.unwrap().success);

    let replay = h.service.verify_otp(EMAIL, &code).await.unwrap();
    assert!(!replay.success);
    assert_eq!(replay.message, "Invalid verification code.");
    assert!(replay.attempts_left.is_none());
}

// ============================================================================
// Attempt counting
// ============================================================================

#[tokio::test]
async fn three_wrong_guesses_lock_out_even_the_correct_code() {
    let h = harness().await;

    h.service.send_otp(EMAIL).await.unwrap();
    let code = h.mailer.last_code().await.unwrap();

    for expected_left in [2, 1, 0] {
        let outcome = h.service.verify_otp(EMAIL, wrong(&code)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts_left, Some(expected_left));
    }

    // The correct code is now locked out too.
    let locked = h.service.verify_otp(EMAIL, &code).await.unwrap();
    assert!(!locked.success);
    assert!(locked.message.contains("Maximum verification attempts"));

    // A fresh send resets the state machine.
    h.service.send_otp(EMAIL).await.unwrap();
    let code = h.mailer.last_code().await.unwrap();
    assert!(h.service.verify_otp(EMAIL, &code).await.unwrap().success);
}

#[tokio::test]
async fn expiry_is_reported_without_charging_attempts() {
    let h = harness().await;

    h.service.send_otp(EMAIL).await.unwrap();
    let code = h.mailer.last_code().await.unwrap();

    h.clock.advance(Duration::minutes(11));

    let outcome = h.service.verify_otp(EMAIL, &code).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("expired"));

    // Expired lookups never bump the attempt counter.
    assert_eq!(h.store.otp_codes().await[0].attempts, 0);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn the_sixth_send_within_an_hour_is_throttled() {
    let h = harness().await;

    for _ in 0..5 {
        assert!(h.service.send_otp(EMAIL).await.unwrap().success);
    }

    let throttled = h.service.send_otp(EMAIL).await.unwrap();
    assert!(!throttled.success);
    assert!(throttled.retry_after.unwrap() > 0);

    // The window rolls over after an hour.
    h.clock.advance(Duration::seconds(3601));
    assert!(h.service.send_otp(EMAIL).await.unwrap().success);
}

#[tokio::test]
async fn dispatch_failure_propagates_and_spares_the_send_budget() {
    let h = harness().await;

    h.mailer.fail_next();
    let err = h.service.send_otp(EMAIL).await.unwrap_err();
    assert!(matches!(err, OtpError::Dispatch(_)));

    // The failed dispatch did not consume any of the hourly budget.
    for _ in 0..5 {
        assert!(h.service.send_otp(EMAIL).await.unwrap().success);
    }
    assert_eq!(h.mailer.sent_count().await, 5);
}

// ============================================================================
// Anti-enumeration
// ============================================================================

#[tokio::test]
async fn unknown_emails_get_the_same_success_shape() {
    let h = harness().await;

    let ghost = h.service.send_otp("ghost@example.com").await.unwrap();
    let real = h.service.send_otp(EMAIL).await.unwrap();

    assert!(ghost.success);
    assert_eq!(ghost.message, real.message);

    // But nothing was stored or dispatched for the unknown address.
    assert_eq!(h.mailer.sent_count().await, 1);
    assert!(h
        .store
        .otp_codes()
        .await
        .iter()
        .all(|c| c.email.eq_ignore_ascii_case(EMAIL)));
}

// ============================================================================
// Cleanup sweep
// ============================================================================

#[tokio::test]
async fn sweep_removes_expired_and_exhausted_codes() {
    let h = harness().await;

    // Expired code.
    h.service.send_otp(EMAIL).await.unwrap();
    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.service.cleanup_expired().await.unwrap(), 1);
    assert!(h.store.otp_codes().await.is_empty());

    // Exhausted code.
    h.service.send_otp(EMAIL).await.unwrap();
    let code = h.mailer.last_code().await.unwrap();
    for _ in 0..3 {
        h.service.verify_otp(EMAIL, wrong(&code)).await.unwrap();
    }
    assert_eq!(h.service.cleanup_expired().await.unwrap(), 1);

    // Idempotent once everything is gone.
    assert_eq!(h.service.cleanup_expired().await.unwrap(), 0);
}

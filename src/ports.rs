//! Storage ports for the platform core
//!
//! The engine and the OTP protocol only ever touch persistence through the
//! traits in this module. `adapters::postgres` implements them over a
//! connection pool for production; `adapters::memory` implements them over
//! in-process maps for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuthSession, Investment, InvestmentRepayment, InvestmentStatus, NewRepayment, OtpCode, Payment,
    RepaymentTotals, User,
};

/// Storage-layer errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("repayment schedule is locked by settled installments")]
    ScheduleLocked,

    #[error("repayment is not payable in its current state")]
    NotPayable,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Guard applied when a schedule replacement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleGuard {
    /// Replace unconditionally (initial generation).
    None,
    /// Refuse to touch a schedule that already has settled installments.
    RejectIfAnyPaid,
}

/// Result of posting a payment: both mutated rows, post-update.
#[derive(Debug, Clone)]
pub struct PaymentApplied {
    pub repayment: InvestmentRepayment,
    pub investment: Investment,
}

/// Access to investments and their repayment schedules.
#[async_trait]
pub trait InvestmentStore: Send + Sync {
    async fn investment(&self, id: Uuid) -> StoreResult<Investment>;

    /// The full schedule, ordered by payment number.
    async fn schedule(&self, investment_id: Uuid) -> StoreResult<Vec<InvestmentRepayment>>;

    async fn repayment(&self, id: Uuid) -> StoreResult<InvestmentRepayment>;

    /// Atomically persist the derived totals and status and replace the
    /// schedule rows. The guard is evaluated inside the same transaction
    /// as the destructive delete; on [`StoreError::ScheduleLocked`] the
    /// existing rows are left untouched.
    async fn store_schedule(
        &self,
        investment_id: Uuid,
        totals: &RepaymentTotals,
        status: InvestmentStatus,
        rows: &[NewRepayment],
        guard: ScheduleGuard,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Atomically stamp a repayment paid and roll the amount into the
    /// owning investment, serializing on the investment row.
    async fn apply_payment(&self, repayment_id: Uuid, payment: &Payment)
        -> StoreResult<PaymentApplied>;

    /// Flip pending repayments past their due date to overdue; returns the
    /// number of rows changed.
    async fn mark_overdue(&self, today: DateTime<Utc>) -> StoreResult<u64>;
}

/// Access to issued one-time passcodes.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a fresh code, replacing any prior codes for the same email.
    async fn replace_for_email(&self, code: &OtpCode) -> StoreResult<()>;

    /// The live code for an email, if any.
    async fn latest_for_email(&self, email: &str) -> StoreResult<Option<OtpCode>>;

    /// Atomically bump the attempt counter (only while below the cap) and
    /// return the resulting count.
    async fn register_failed_attempt(&self, id: Uuid, max_attempts: i32) -> StoreResult<i32>;

    /// Delete every code for the email; returns how many were removed.
    /// A zero count means a concurrent verification won the race.
    async fn consume(&self, email: &str) -> StoreResult<u64>;

    /// Delete codes that are expired or attempt-exhausted.
    async fn purge_stale(&self, now: DateTime<Utc>, max_attempts: i32) -> StoreResult<u64>;
}

/// Account lookups needed by the OTP flow.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Recording of issued sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &AuthSession) -> StoreResult<()>;
}

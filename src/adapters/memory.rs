//! In-memory store
//!
//! Backs the test suites and local development. All five ports are
//! implemented over a single state struct behind one RwLock, so every
//! multi-row operation is naturally atomic: a writer holds the lock for
//! the whole critical section.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AuthSession, Investment, InvestmentRepayment, InvestmentStatus, NewRepayment, OtpCode, Payment,
    RepaymentStatus, RepaymentTotals, User,
};
use crate::ports::{
    InvestmentStore, OtpStore, PaymentApplied, ScheduleGuard, SessionStore, StoreError,
    StoreResult, UserStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    investments: HashMap<Uuid, Investment>,
    repayments: HashMap<Uuid, InvestmentRepayment>,
    otp_codes: Vec<OtpCode>,
    users: HashMap<Uuid, User>,
    sessions: Vec<AuthSession>,
}

/// In-process implementation of all store ports
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_investment(&self, investment: Investment) {
        let mut state = self.inner.write().await;
        state.investments.insert(investment.id, investment);
    }

    pub async fn insert_user(&self, user: User) {
        let mut state = self.inner.write().await;
        state.users.insert(user.id, user);
    }

    /// Snapshot of the stored codes, for test inspection.
    pub async fn otp_codes(&self) -> Vec<OtpCode> {
        self.inner.read().await.otp_codes.clone()
    }

    /// Snapshot of the recorded sessions, for test inspection.
    pub async fn sessions(&self) -> Vec<AuthSession> {
        self.inner.read().await.sessions.clone()
    }
}

#[async_trait]
impl InvestmentStore for MemoryStore {
    async fn investment(&self, id: Uuid) -> StoreResult<Investment> {
        let state = self.inner.read().await;
        state
            .investments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("investment {id}")))
    }

    async fn schedule(&self, investment_id: Uuid) -> StoreResult<Vec<InvestmentRepayment>> {
        let state = self.inner.read().await;
        let mut rows: Vec<InvestmentRepayment> = state
            .repayments
            .values()
            .filter(|r| r.investment_id == investment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.payment_number);
        Ok(rows)
    }

    async fn repayment(&self, id: Uuid) -> StoreResult<InvestmentRepayment> {
        let state = self.inner.read().await;
        state
            .repayments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("repayment {id}")))
    }

    async fn store_schedule(
        &self,
        investment_id: Uuid,
        totals: &RepaymentTotals,
        status: InvestmentStatus,
        rows: &[NewRepayment],
        guard: ScheduleGuard,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.inner.write().await;

        if !state.investments.contains_key(&investment_id) {
            return Err(StoreError::NotFound(format!("investment {investment_id}")));
        }

        if guard == ScheduleGuard::RejectIfAnyPaid
            && state
                .repayments
                .values()
                .any(|r| r.investment_id == investment_id && r.status == RepaymentStatus::Paid)
        {
            return Err(StoreError::ScheduleLocked);
        }

        state.repayments.retain(|_, r| r.investment_id != investment_id);
        for row in rows {
            let id = Uuid::new_v4();
            state.repayments.insert(
                id,
                InvestmentRepayment {
                    id,
                    investment_id,
                    payment_number: row.payment_number,
                    total_payments: row.total_payments,
                    due_date: row.due_date,
                    principal_amount: row.principal_amount,
                    interest_amount: row.interest_amount,
                    amount: row.amount,
                    status: RepaymentStatus::Pending,
                    paid_at: None,
                    payment_method: None,
                    payment_reference: None,
                    created_at: now,
                },
            );
        }

        let investment = state
            .investments
            .get_mut(&investment_id)
            .ok_or_else(|| StoreError::NotFound(format!("investment {investment_id}")))?;
        investment.total_interest = totals.interest;
        investment.total_repayment = totals.total;
        investment.status = status;
        investment.updated_at = now;

        Ok(())
    }

    async fn apply_payment(
        &self,
        repayment_id: Uuid,
        payment: &Payment,
    ) -> StoreResult<PaymentApplied> {
        let mut state = self.inner.write().await;

        let repayment = state
            .repayments
            .get_mut(&repayment_id)
            .ok_or_else(|| StoreError::NotFound(format!("repayment {repayment_id}")))?;

        if !matches!(
            repayment.status,
            RepaymentStatus::Pending | RepaymentStatus::Overdue
        ) {
            return Err(StoreError::NotPayable);
        }

        repayment.status = RepaymentStatus::Paid;
        repayment.paid_at = Some(payment.paid_at);
        repayment.payment_method = Some(payment.method.clone());
        repayment.payment_reference = payment.reference.clone();
        let repayment = repayment.clone();

        let investment = state
            .investments
            .get_mut(&repayment.investment_id)
            .ok_or_else(|| StoreError::NotFound(format!("investment {}", repayment.investment_id)))?;
        investment.register_payment(payment.amount);
        investment.updated_at = payment.paid_at;

        Ok(PaymentApplied {
            repayment,
            investment: investment.clone(),
        })
    }

    async fn mark_overdue(&self, today: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.inner.write().await;
        let mut flipped = 0;
        for repayment in state.repayments.values_mut() {
            if repayment.status == RepaymentStatus::Pending && repayment.due_date < today {
                repayment.status = RepaymentStatus::Overdue;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn replace_for_email(&self, code: &OtpCode) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        state
            .otp_codes
            .retain(|c| !c.email.eq_ignore_ascii_case(&code.email));
        state.otp_codes.push(code.clone());
        Ok(())
    }

    async fn latest_for_email(&self, email: &str) -> StoreResult<Option<OtpCode>> {
        let state = self.inner.read().await;
        Ok(state
            .otp_codes
            .iter()
            .filter(|c| c.email.eq_ignore_ascii_case(email))
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn register_failed_attempt(&self, id: Uuid, max_attempts: i32) -> StoreResult<i32> {
        let mut state = self.inner.write().await;
        let code = state
            .otp_codes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("otp code {id}")))?;
        if code.attempts < max_attempts {
            code.attempts += 1;
        }
        Ok(code.attempts)
    }

    async fn consume(&self, email: &str) -> StoreResult<u64> {
        let mut state = self.inner.write().await;
        let before = state.otp_codes.len();
        state
            .otp_codes
            .retain(|c| !c.email.eq_ignore_ascii_case(email));
        Ok((before - state.otp_codes.len()) as u64)
    }

    async fn purge_stale(&self, now: DateTime<Utc>, max_attempts: i32) -> StoreResult<u64> {
        let mut state = self.inner.write().await;
        let before = state.otp_codes.len();
        state
            .otp_codes
            .retain(|c| !c.is_expired(now) && !c.is_locked(max_attempts));
        Ok((before - state.otp_codes.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.inner.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        if user.email_verified_at.is_none() {
            user.email_verified_at = Some(at);
            user.updated_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &AuthSession) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        state.sessions.push(session.clone());
        Ok(())
    }
}

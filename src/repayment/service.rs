//! Repayment schedule lifecycle service

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{
    Investment, InvestmentStatus, InvestmentSummary, InstallmentView, Payment,
};
use crate::ports::{InvestmentStore, PaymentApplied, ScheduleGuard, StoreError};
use validator::Validate;

use super::calculator;

/// Repayment engine errors
#[derive(Error, Debug)]
pub enum RepaymentError {
    #[error("investment {0} not found")]
    InvestmentNotFound(Uuid),

    #[error("repayment {0} not found")]
    RepaymentNotFound(Uuid),

    #[error("cannot regenerate a schedule with settled installments")]
    ScheduleLocked,

    #[error("repayment {0} is not payable (already settled or cancelled)")]
    NotPayable(Uuid),

    #[error("investment {id} cannot be verified from status {status:?}")]
    InvalidStatus {
        id: Uuid,
        status: InvestmentStatus,
    },

    #[error("invalid investment terms: {0}")]
    InvalidTerms(String),

    #[error("repayment schedule would be empty for a {0}-month term")]
    EmptySchedule(i32),

    #[error("due date arithmetic overflowed")]
    DueDateOverflow,

    #[error(transparent)]
    Store(StoreError),
}

/// Repayment schedule service
#[derive(Clone)]
pub struct RepaymentService {
    store: Arc<dyn InvestmentStore>,
    clock: Arc<dyn Clock>,
    late_fee_percent: Decimal,
}

impl RepaymentService {
    pub fn new(
        store: Arc<dyn InvestmentStore>,
        clock: Arc<dyn Clock>,
        late_fee_percent: Decimal,
    ) -> Self {
        Self {
            store,
            clock,
            late_fee_percent,
        }
    }

    /// Verify a pending investment: compute its totals, generate the
    /// repayment schedule, and persist both atomically.
    pub async fn verify_investment(&self, id: Uuid) -> Result<Investment, RepaymentError> {
        let investment = self.fetch_investment(id).await?;
        if investment.status != InvestmentStatus::Pending {
            return Err(RepaymentError::InvalidStatus {
                id,
                status: investment.status,
            });
        }

        let rows = self.compute_schedule(&investment)?;
        let totals = calculator::calculate_totals(
            investment.amount,
            investment.interest_rate,
            investment.duration_months,
        );

        self.store
            .store_schedule(
                id,
                &totals,
                InvestmentStatus::Verified,
                &rows,
                ScheduleGuard::None,
                self.clock.now(),
            )
            .await
            .map_err(|e| Self::map_store_error(e, id))?;

        tracing::info!(
            investment_id = %id,
            installments = rows.len(),
            total_repayment = %totals.total,
            "repayment schedule generated"
        );

        self.fetch_investment(id).await
    }

    /// Regenerate the schedule after the investment terms changed.
    ///
    /// Refused outright once any installment has been settled; the guard
    /// runs inside the replacement transaction so no rows are lost when a
    /// payment lands concurrently.
    pub async fn recalculate_schedule(&self, id: Uuid) -> Result<Investment, RepaymentError> {
        let investment = self.fetch_investment(id).await?;
        if matches!(
            investment.status,
            InvestmentStatus::Completed | InvestmentStatus::Cancelled
        ) {
            return Err(RepaymentError::InvalidStatus {
                id,
                status: investment.status,
            });
        }

        let rows = self.compute_schedule(&investment)?;
        let totals = calculator::calculate_totals(
            investment.amount,
            investment.interest_rate,
            investment.duration_months,
        );

        self.store
            .store_schedule(
                id,
                &totals,
                investment.status,
                &rows,
                ScheduleGuard::RejectIfAnyPaid,
                self.clock.now(),
            )
            .await
            .map_err(|e| Self::map_store_error(e, id))?;

        tracing::info!(
            investment_id = %id,
            installments = rows.len(),
            "repayment schedule recalculated"
        );

        self.fetch_investment(id).await
    }

    /// Post a payment against an installment.
    ///
    /// Stamps the installment paid, rolls the amount into the investment's
    /// running total, and completes the investment once the full repayment
    /// amount has been collected. The two-row update is atomic.
    pub async fn mark_repayment_paid(
        &self,
        repayment_id: Uuid,
        amount_paid: Decimal,
        method: &str,
        reference: Option<&str>,
    ) -> Result<PaymentApplied, RepaymentError> {
        let payment = Payment {
            amount: amount_paid,
            method: method.to_string(),
            reference: reference.map(str::to_string),
            paid_at: self.clock.now(),
        };

        let applied = self
            .store
            .apply_payment(repayment_id, &payment)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => RepaymentError::RepaymentNotFound(repayment_id),
                StoreError::NotPayable => RepaymentError::NotPayable(repayment_id),
                other => RepaymentError::Store(other),
            })?;

        tracing::info!(
            repayment_id = %repayment_id,
            investment_id = %applied.investment.id,
            amount = %amount_paid,
            paid_amount = %applied.investment.paid_amount,
            completed = applied.investment.status == InvestmentStatus::Completed,
            "repayment posted"
        );

        Ok(applied)
    }

    /// Late fee accrued on a single installment as of now.
    pub async fn repayment_late_fee(&self, repayment_id: Uuid) -> Result<Decimal, RepaymentError> {
        let repayment = self.store.repayment(repayment_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => RepaymentError::RepaymentNotFound(repayment_id),
            other => RepaymentError::Store(other),
        })?;
        Ok(calculator::late_fee(
            &repayment,
            self.late_fee_percent,
            self.clock.now(),
        ))
    }

    /// Flip pending installments past their due date to overdue.
    pub async fn mark_overdue_repayments(&self) -> Result<u64, RepaymentError> {
        let flipped = self
            .store
            .mark_overdue(self.clock.now())
            .await
            .map_err(RepaymentError::Store)?;
        if flipped > 0 {
            tracing::info!(count = flipped, "repayments marked overdue");
        }
        Ok(flipped)
    }

    /// Reporting view of an investment: balances, completion, and
    /// per-installment late fees as of now.
    pub async fn investment_summary(&self, id: Uuid) -> Result<InvestmentSummary, RepaymentError> {
        let investment = self.fetch_investment(id).await?;
        let schedule = self
            .store
            .schedule(id)
            .await
            .map_err(RepaymentError::Store)?;
        let now = self.clock.now();

        let installments = schedule
            .iter()
            .map(|r| InstallmentView {
                repayment_id: r.id,
                payment_number: r.payment_number,
                due_date: r.due_date,
                amount: r.amount,
                status: r.status,
                late_fee: calculator::late_fee(r, self.late_fee_percent, now),
            })
            .collect();

        Ok(InvestmentSummary {
            investment_id: investment.id,
            status: investment.status,
            total_repayment: investment.total_repayment,
            paid_amount: investment.paid_amount,
            remaining_balance: calculator::remaining_balance(&investment),
            completion_percentage: calculator::completion_percentage(&investment),
            installments,
        })
    }

    fn compute_schedule(
        &self,
        investment: &Investment,
    ) -> Result<Vec<crate::models::NewRepayment>, RepaymentError> {
        let terms = investment.terms();
        terms
            .validate()
            .map_err(|e| RepaymentError::InvalidTerms(e.to_string()))?;

        let anchor = investment.start_date.unwrap_or_else(|| self.clock.now());
        calculator::build_schedule(&terms, anchor)
    }

    async fn fetch_investment(&self, id: Uuid) -> Result<Investment, RepaymentError> {
        self.store.investment(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => RepaymentError::InvestmentNotFound(id),
            other => RepaymentError::Store(other),
        })
    }

    fn map_store_error(e: StoreError, id: Uuid) -> RepaymentError {
        match e {
            StoreError::NotFound(_) => RepaymentError::InvestmentNotFound(id),
            StoreError::ScheduleLocked => RepaymentError::ScheduleLocked,
            other => RepaymentError::Store(other),
        }
    }
}

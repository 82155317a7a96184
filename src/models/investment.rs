//! Investment and repayment-schedule models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Investment status over its lifecycle
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "investment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Pending,
    Verified,
    Active,
    Completed,
    Cancelled,
}

/// How often installments fall due
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_interval", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentInterval {
    Monthly,
    Quarterly,
    Annually,
}

impl RepaymentInterval {
    /// Calendar months between consecutive installments.
    pub fn step_months(&self) -> u32 {
        match self {
            RepaymentInterval::Monthly => 1,
            RepaymentInterval::Quarterly => 3,
            RepaymentInterval::Annually => 12,
        }
    }

    /// Number of installments for a term, rounding partial periods up.
    pub fn installment_count(&self, duration_months: i32) -> i32 {
        let step = self.step_months() as i32;
        (duration_months + step - 1) / step
    }
}

/// Status of a single installment
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

/// Investment model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Investment {
    pub id: Uuid,
    pub investor_id: Uuid,
    pub plant_id: Uuid,
    pub amount: Decimal,
    /// Annual interest rate in percent
    pub interest_rate: Decimal,
    pub duration_months: i32,
    pub repayment_interval: RepaymentInterval,
    pub total_interest: Decimal,
    pub total_repayment: Decimal,
    pub paid_amount: Decimal,
    /// Anchor for due-date generation; falls back to the verification time.
    pub start_date: Option<DateTime<Utc>>,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    /// The contractual terms the schedule is derived from.
    pub fn terms(&self) -> InvestmentTerms {
        InvestmentTerms {
            amount: self.amount,
            annual_rate: self.interest_rate,
            duration_months: self.duration_months,
            interval: self.repayment_interval,
        }
    }

    /// Roll a posted payment into the running total, transitioning to
    /// completed once the full repayment amount has been collected.
    /// Callers must invoke this inside the same critical section that
    /// stamps the repayment paid.
    pub fn register_payment(&mut self, amount: Decimal) {
        self.paid_amount += amount;
        if self.total_repayment > Decimal::ZERO && self.paid_amount >= self.total_repayment {
            self.status = InvestmentStatus::Completed;
        }
    }
}

/// Contractual terms a repayment schedule is computed from
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentTerms {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    #[validate(custom = "validate_rate")]
    pub annual_rate: Decimal,
    #[validate(range(min = 1, max = 600))]
    pub duration_months: i32,
    pub interval: RepaymentInterval,
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive"));
    }
    Ok(())
}

fn validate_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO || *rate > Decimal::from(100) {
        return Err(ValidationError::new("rate_out_of_range"));
    }
    Ok(())
}

/// Principal/interest breakdown for a full term
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RepaymentTotals {
    pub principal: Decimal,
    pub interest: Decimal,
    pub total: Decimal,
}

/// One scheduled installment
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct InvestmentRepayment {
    pub id: Uuid,
    pub investment_id: Uuid,
    /// 1-based position within the schedule
    pub payment_number: i32,
    pub total_payments: i32,
    pub due_date: DateTime<Utc>,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub amount: Decimal,
    pub status: RepaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Installment produced by the schedule calculator, before persistence
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct NewRepayment {
    pub payment_number: i32,
    pub total_payments: i32,
    pub due_date: DateTime<Utc>,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub amount: Decimal,
}

/// A payment posted against a scheduled installment
#[derive(Debug, Clone)]
pub struct Payment {
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Reporting view of an investment and its schedule
#[derive(Debug, Serialize, Clone)]
pub struct InvestmentSummary {
    pub investment_id: Uuid,
    pub status: InvestmentStatus,
    pub total_repayment: Decimal,
    pub paid_amount: Decimal,
    pub remaining_balance: Decimal,
    pub completion_percentage: Decimal,
    pub installments: Vec<InstallmentView>,
}

/// Per-installment line of the summary report
#[derive(Debug, Serialize, Clone)]
pub struct InstallmentView {
    pub repayment_id: Uuid,
    pub payment_number: i32,
    pub due_date: DateTime<Utc>,
    pub amount: Decimal,
    pub status: RepaymentStatus,
    pub late_fee: Decimal,
}

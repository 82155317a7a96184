//! Amortization math for investment repayment schedules
//!
//! Interest is simple (non-compounding): computed once on the full
//! principal over the full term, regardless of the repayment interval.
//! Installments split the totals evenly; every installment except the last
//! is rounded to cents independently and the last absorbs the residual, so
//! the schedule always sums back to the exact totals.

use chrono::{DateTime, Months, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::models::{
    Investment, InvestmentRepayment, InvestmentTerms, NewRepayment, RepaymentStatus,
    RepaymentTotals,
};

use super::service::RepaymentError;

/// Round a monetary amount to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Simple interest over the full term.
///
/// `interest = principal * rate/100 * months/12`; no rounding is applied
/// here, the per-installment split is where amounts become cents.
pub fn calculate_totals(
    principal: Decimal,
    annual_rate_percent: Decimal,
    duration_months: i32,
) -> RepaymentTotals {
    let years = Decimal::from(duration_months) / dec!(12);
    let interest = principal * annual_rate_percent / dec!(100) * years;
    RepaymentTotals {
        principal,
        interest,
        total: principal + interest,
    }
}

/// Build the ordered installment rows for a term anchored at `anchor`.
///
/// Due dates step in calendar months from the anchor (1, 3, or 12 months
/// per installment), each computed from the anchor itself so regeneration
/// is deterministic.
pub fn build_schedule(
    terms: &InvestmentTerms,
    anchor: DateTime<Utc>,
) -> Result<Vec<NewRepayment>, RepaymentError> {
    let totals = calculate_totals(terms.amount, terms.annual_rate, terms.duration_months);
    let count = terms.interval.installment_count(terms.duration_months);
    if count < 1 {
        return Err(RepaymentError::EmptySchedule(terms.duration_months));
    }

    let step = terms.interval.step_months();
    let n = Decimal::from(count);
    let principal_each = round_money(totals.principal / n);
    let interest_each = round_money(totals.interest / n);

    let mut rows = Vec::with_capacity(count as usize);
    for i in 0..count {
        let is_last = i == count - 1;
        let settled = Decimal::from(count - 1);
        let principal = if is_last {
            totals.principal - principal_each * settled
        } else {
            principal_each
        };
        let interest = if is_last {
            totals.interest - interest_each * settled
        } else {
            interest_each
        };

        let due_date = anchor
            .checked_add_months(Months::new(step * (i as u32 + 1)))
            .ok_or(RepaymentError::DueDateOverflow)?;

        rows.push(NewRepayment {
            payment_number: i + 1,
            total_payments: count,
            due_date,
            principal_amount: principal,
            interest_amount: interest,
            amount: principal + interest,
        });
    }

    Ok(rows)
}

/// Outstanding amount on an investment.
pub fn remaining_balance(investment: &Investment) -> Decimal {
    investment.total_repayment - investment.paid_amount
}

/// How far through repayment the investment is, in percent.
pub fn completion_percentage(investment: &Investment) -> Decimal {
    if investment.total_repayment.is_zero() {
        return Decimal::ZERO;
    }
    investment.paid_amount / investment.total_repayment * dec!(100)
}

/// Late fee accrued on an unsettled installment.
///
/// Zero unless the installment is past due and still collectible
/// (pending or already flagged overdue). Accrues per started 30-day
/// block: `amount * pct/100 * ceil(days/30)`, rounded to cents.
pub fn late_fee(
    repayment: &InvestmentRepayment,
    late_fee_percent: Decimal,
    today: DateTime<Utc>,
) -> Decimal {
    let collectible = matches!(
        repayment.status,
        RepaymentStatus::Pending | RepaymentStatus::Overdue
    );
    if !collectible || repayment.due_date >= today {
        return Decimal::ZERO;
    }

    let days_overdue = (today - repayment.due_date).num_days();
    let blocks = Decimal::from((days_overdue + 29) / 30);
    round_money(repayment.amount * late_fee_percent / dec!(100) * blocks)
}

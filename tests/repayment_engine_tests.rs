//! Repayment engine lifecycle tests
//!
//! These drive the schedule service end-to-end over the in-memory store
//! with a manually held clock, so generation, recalculation, payment
//! posting, and overdue detection are fully deterministic.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use solarvest_core::adapters::MemoryStore;
use solarvest_core::clock::ManualClock;
use solarvest_core::models::{Investment, InvestmentStatus, RepaymentInterval, RepaymentStatus};
use solarvest_core::ports::InvestmentStore;
use solarvest_core::repayment::{RepaymentError, RepaymentService};

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()
}

fn pending_investment(
    amount: Decimal,
    rate: Decimal,
    months: i32,
    interval: RepaymentInterval,
) -> Investment {
    Investment {
        id: Uuid::new_v4(),
        investor_id: Uuid::new_v4(),
        plant_id: Uuid::new_v4(),
        amount,
        interest_rate: rate,
        duration_months: months,
        repayment_interval: interval,
        total_interest: Decimal::ZERO,
        total_repayment: Decimal::ZERO,
        paid_amount: Decimal::ZERO,
        start_date: Some(anchor()),
        status: InvestmentStatus::Pending,
        created_at: anchor(),
        updated_at: anchor(),
    }
}

async fn setup(
    investment: Investment,
) -> (MemoryStore, Arc<ManualClock>, RepaymentService, Uuid) {
    let store = MemoryStore::new();
    let id = investment.id;
    store.insert_investment(investment).await;

    let clock = Arc::new(ManualClock::new(anchor()));
    let service = RepaymentService::new(Arc::new(store.clone()), clock.clone(), dec!(5.0));
    (store, clock, service, id)
}

// ============================================================================
// Schedule generation
// ============================================================================

#[tokio::test]
async fn verification_generates_a_schedule_that_sums_exactly() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 7, RepaymentInterval::Monthly)).await;

    let investment = service.verify_investment(id).await.unwrap();
    assert_eq!(investment.status, InvestmentStatus::Verified);
    assert_eq!(
        investment.total_repayment,
        investment.amount + investment.total_interest
    );

    let schedule = store.schedule(id).await.unwrap();
    assert_eq!(schedule.len(), 7);

    for row in &schedule[..6] {
        assert_eq!(row.principal_amount, dec!(142.86));
    }
    assert_eq!(schedule[6].principal_amount, dec!(142.84));

    let principal_sum: Decimal = schedule.iter().map(|r| r.principal_amount).sum();
    assert_eq!(principal_sum, dec!(1000));

    let amount_sum: Decimal = schedule.iter().map(|r| r.amount).sum();
    assert_eq!(amount_sum, investment.total_repayment);

    assert!(schedule
        .iter()
        .all(|r| r.status == RepaymentStatus::Pending && r.total_payments == 7));
}

#[tokio::test]
async fn quarterly_interval_rounds_installment_count_up() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(5000), dec!(4), 10, RepaymentInterval::Quarterly)).await;

    service.verify_investment(id).await.unwrap();

    let schedule = store.schedule(id).await.unwrap();
    assert_eq!(schedule.len(), 4);
    assert_eq!(
        schedule[0].due_date,
        Utc.with_ymd_and_hms(2025, 4, 15, 0, 0, 0).unwrap()
    );
    assert_eq!(
        schedule[3].due_date,
        Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn due_dates_step_monthly_from_the_start_date() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1200), dec!(6), 12, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();

    let schedule = store.schedule(id).await.unwrap();
    assert_eq!(schedule[2].payment_number, 3);
    assert_eq!(
        schedule[2].due_date,
        Utc.with_ymd_and_hms(2025, 4, 15, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn verification_requires_a_pending_investment() {
    let (_, _, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 12, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let err = service.verify_investment(id).await.unwrap_err();
    assert!(matches!(err, RepaymentError::InvalidStatus { .. }));
}

#[tokio::test]
async fn unknown_investment_is_reported() {
    let (_, _, service, _) =
        setup(pending_investment(dec!(1000), dec!(5), 12, RepaymentInterval::Monthly)).await;

    let missing = Uuid::new_v4();
    let err = service.verify_investment(missing).await.unwrap_err();
    assert!(matches!(err, RepaymentError::InvestmentNotFound(id) if id == missing));
}

// ============================================================================
// Recalculation
// ============================================================================

#[tokio::test]
async fn regeneration_is_deterministic_under_a_held_clock() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(9999.99), dec!(3.25), 13, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let first = store.schedule(id).await.unwrap();

    service.recalculate_schedule(id).await.unwrap();
    let second = store.schedule(id).await.unwrap();

    let shape = |rows: &[solarvest_core::models::InvestmentRepayment]| {
        rows.iter()
            .map(|r| {
                (
                    r.payment_number,
                    r.due_date,
                    r.principal_amount,
                    r.interest_amount,
                    r.amount,
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[tokio::test]
async fn recalculation_is_refused_once_a_payment_landed() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 7, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let schedule = store.schedule(id).await.unwrap();
    let first = &schedule[0];

    service
        .mark_repayment_paid(first.id, first.amount, "bank_transfer", Some("TX-1001"))
        .await
        .unwrap();

    let err = service.recalculate_schedule(id).await.unwrap_err();
    assert!(matches!(err, RepaymentError::ScheduleLocked));

    // The existing schedule survived the refused replacement.
    let after = store.schedule(id).await.unwrap();
    assert_eq!(after.len(), 7);
    assert_eq!(after[0].status, RepaymentStatus::Paid);
    assert_eq!(after[0].payment_reference.as_deref(), Some("TX-1001"));
}

// ============================================================================
// Payment posting
// ============================================================================

#[tokio::test]
async fn payments_accrue_and_complete_the_investment() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1200), dec!(0), 2, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let schedule = store.schedule(id).await.unwrap();
    assert_eq!(schedule.len(), 2);

    let applied = service
        .mark_repayment_paid(schedule[0].id, schedule[0].amount, "bank_transfer", None)
        .await
        .unwrap();
    assert_eq!(applied.investment.paid_amount, dec!(600.00));
    assert_eq!(applied.investment.status, InvestmentStatus::Verified);
    assert!(applied.repayment.paid_at.is_some());

    let applied = service
        .mark_repayment_paid(schedule[1].id, schedule[1].amount, "bank_transfer", None)
        .await
        .unwrap();
    assert_eq!(applied.investment.paid_amount, dec!(1200.00));
    assert_eq!(applied.investment.status, InvestmentStatus::Completed);
}

#[tokio::test]
async fn a_settled_repayment_cannot_be_paid_twice() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 7, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let schedule = store.schedule(id).await.unwrap();

    service
        .mark_repayment_paid(schedule[0].id, schedule[0].amount, "bank_transfer", None)
        .await
        .unwrap();
    let err = service
        .mark_repayment_paid(schedule[0].id, schedule[0].amount, "bank_transfer", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepaymentError::NotPayable(_)));

    // The running total was charged exactly once.
    let investment = store.investment(id).await.unwrap();
    assert_eq!(investment.paid_amount, schedule[0].amount);
}

// ============================================================================
// Overdue detection and reporting
// ============================================================================

#[tokio::test]
async fn overdue_marking_and_late_fees_follow_the_clock() {
    let (store, clock, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 7, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();

    // Nothing due yet.
    assert_eq!(service.mark_overdue_repayments().await.unwrap(), 0);

    // One day past the first due date.
    clock.set(anchor() + Duration::days(31) + Duration::days(1));
    assert_eq!(service.mark_overdue_repayments().await.unwrap(), 1);

    let schedule = store.schedule(id).await.unwrap();
    assert_eq!(schedule[0].status, RepaymentStatus::Overdue);
    assert_eq!(schedule[1].status, RepaymentStatus::Pending);

    let summary = service.investment_summary(id).await.unwrap();
    let first = &summary.installments[0];
    // One started 30-day block at 5%.
    assert_eq!(
        first.late_fee,
        (first.amount * dec!(0.05)).round_dp(2)
    );
    assert_eq!(summary.installments[1].late_fee, Decimal::ZERO);
}

#[tokio::test]
async fn late_fee_starts_the_day_after_the_due_date() {
    let (store, clock, service, id) =
        setup(pending_investment(dec!(1000), dec!(5), 7, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let schedule = store.schedule(id).await.unwrap();
    let first = &schedule[0];

    // Due exactly now: nothing accrues yet.
    clock.set(first.due_date);
    assert_eq!(
        service.repayment_late_fee(first.id).await.unwrap(),
        Decimal::ZERO
    );

    // 31 days past due: two started 30-day blocks at 5%.
    clock.set(first.due_date + Duration::days(31));
    assert_eq!(
        service.repayment_late_fee(first.id).await.unwrap(),
        (first.amount * dec!(0.05) * dec!(2)).round_dp(2)
    );
}

#[tokio::test]
async fn summary_reports_balance_and_completion() {
    let (store, _, service, id) =
        setup(pending_investment(dec!(1200), dec!(0), 2, RepaymentInterval::Monthly)).await;

    service.verify_investment(id).await.unwrap();
    let schedule = store.schedule(id).await.unwrap();

    service
        .mark_repayment_paid(schedule[0].id, schedule[0].amount, "bank_transfer", None)
        .await
        .unwrap();

    let summary = service.investment_summary(id).await.unwrap();
    assert_eq!(summary.paid_amount, dec!(600.00));
    assert_eq!(summary.remaining_balance, dec!(600.00));
    assert_eq!(summary.completion_percentage, dec!(50));
    assert_eq!(summary.installments.len(), 2);
}

//! Postgres store
//!
//! Implements the store ports over a connection pool. Multi-row
//! operations run in a transaction; payment posting locks both rows with
//! `FOR UPDATE` so concurrent postings against the same investment
//! serialize at the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    AuthSession, Investment, InvestmentRepayment, InvestmentStatus, NewRepayment, OtpCode, Payment,
    RepaymentStatus, RepaymentTotals, User,
};
use crate::ports::{
    InvestmentStore, OtpStore, PaymentApplied, ScheduleGuard, SessionStore, StoreError,
    StoreResult, UserStore,
};

/// Postgres-backed implementation of all store ports
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InvestmentStore for PostgresStore {
    async fn investment(&self, id: Uuid) -> StoreResult<Investment> {
        sqlx::query_as::<_, Investment>("SELECT * FROM investments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("investment {id}")))
    }

    async fn schedule(&self, investment_id: Uuid) -> StoreResult<Vec<InvestmentRepayment>> {
        let rows = sqlx::query_as::<_, InvestmentRepayment>(
            "SELECT * FROM investment_repayments WHERE investment_id = $1 ORDER BY payment_number",
        )
        .bind(investment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn repayment(&self, id: Uuid) -> StoreResult<InvestmentRepayment> {
        sqlx::query_as::<_, InvestmentRepayment>(
            "SELECT * FROM investment_repayments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
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
        let mut tx = self.pool.begin().await?;

        if guard == ScheduleGuard::RejectIfAnyPaid {
            let paid: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM investment_repayments
                WHERE investment_id = $1 AND status = 'paid'
                "#,
            )
            .bind(investment_id)
            .fetch_one(&mut *tx)
            .await?;

            if paid > 0 {
                return Err(StoreError::ScheduleLocked);
            }
        }

        sqlx::query("DELETE FROM investment_repayments WHERE investment_id = $1")
            .bind(investment_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO investment_repayments (
                    id, investment_id, payment_number, total_payments, due_date,
                    principal_amount, interest_amount, amount, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(investment_id)
            .bind(row.payment_number)
            .bind(row.total_payments)
            .bind(row.due_date)
            .bind(row.principal_amount)
            .bind(row.interest_amount)
            .bind(row.amount)
            .bind(RepaymentStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE investments
            SET total_interest = $1, total_repayment = $2, status = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(totals.interest)
        .bind(totals.total)
        .bind(status)
        .bind(now)
        .bind(investment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(format!("investment {investment_id}")));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn apply_payment(
        &self,
        repayment_id: Uuid,
        payment: &Payment,
    ) -> StoreResult<PaymentApplied> {
        let mut tx = self.pool.begin().await?;

        let mut repayment = sqlx::query_as::<_, InvestmentRepayment>(
            "SELECT * FROM investment_repayments WHERE id = $1 FOR UPDATE",
        )
        .bind(repayment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("repayment {repayment_id}")))?;

        if !matches!(
            repayment.status,
            RepaymentStatus::Pending | RepaymentStatus::Overdue
        ) {
            return Err(StoreError::NotPayable);
        }

        sqlx::query(
            r#"
            UPDATE investment_repayments
            SET status = $1, paid_at = $2, payment_method = $3, payment_reference = $4
            WHERE id = $5
            "#,
        )
        .bind(RepaymentStatus::Paid)
        .bind(payment.paid_at)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(repayment_id)
        .execute(&mut *tx)
        .await?;

        let mut investment = sqlx::query_as::<_, Investment>(
            "SELECT * FROM investments WHERE id = $1 FOR UPDATE",
        )
        .bind(repayment.investment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("investment {}", repayment.investment_id)))?;

        investment.register_payment(payment.amount);
        investment.updated_at = payment.paid_at;

        sqlx::query(
            r#"
            UPDATE investments
            SET paid_amount = $1, status = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(investment.paid_amount)
        .bind(investment.status)
        .bind(investment.updated_at)
        .bind(investment.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        repayment.status = RepaymentStatus::Paid;
        repayment.paid_at = Some(payment.paid_at);
        repayment.payment_method = Some(payment.method.clone());
        repayment.payment_reference = payment.reference.clone();

        Ok(PaymentApplied {
            repayment,
            investment,
        })
    }

    async fn mark_overdue(&self, today: DateTime<Utc>) -> StoreResult<u64> {
        let flipped = sqlx::query(
            r#"
            UPDATE investment_repayments
            SET status = 'overdue'
            WHERE status = 'pending' AND due_date < $1
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(flipped)
    }
}

#[async_trait]
impl OtpStore for PostgresStore {
    async fn replace_for_email(&self, code: &OtpCode) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM otp_codes WHERE LOWER(email) = LOWER($1)")
            .bind(&code.email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO otp_codes (id, email, code, expires_at, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(code.id)
        .bind(&code.email)
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(code.attempts)
        .bind(code.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_for_email(&self, email: &str) -> StoreResult<Option<OtpCode>> {
        let code = sqlx::query_as::<_, OtpCode>(
            r#"
            SELECT * FROM otp_codes
            WHERE LOWER(email) = LOWER($1)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    async fn register_failed_attempt(&self, id: Uuid, max_attempts: i32) -> StoreResult<i32> {
        // Compare-and-bump: the predicate keeps two concurrent wrong
        // guesses from pushing the counter past the cap.
        let bumped: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE otp_codes
            SET attempts = attempts + 1
            WHERE id = $1 AND attempts < $2
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(attempts) = bumped {
            return Ok(attempts);
        }

        let attempts: Option<i32> =
            sqlx::query_scalar("SELECT attempts FROM otp_codes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        attempts.ok_or_else(|| StoreError::NotFound(format!("otp code {id}")))
    }

    async fn consume(&self, email: &str) -> StoreResult<u64> {
        let removed = sqlx::query("DELETE FROM otp_codes WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }

    async fn purge_stale(&self, now: DateTime<Utc>, max_attempts: i32) -> StoreResult<u64> {
        let removed = sqlx::query("DELETE FROM otp_codes WHERE expires_at < $1 OR attempts >= $2")
            .bind(now)
            .bind(max_attempts)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verified_at = $1, updated_at = $1
            WHERE id = $2 AND email_verified_at IS NULL
            "#,
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn create_session(&self, session: &AuthSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (id, user_id, jti, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.jti)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! Periodic maintenance
//!
//! One loop covers both housekeeping duties: sweeping stale OTP codes and
//! flagging repayments that have slipped past their due date. Each pass is
//! idempotent, so a missed or doubled tick is harmless.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreResult;
use crate::otp::OtpService;
use crate::repayment::RepaymentService;

/// Background maintenance loop. Runs until the task is dropped.
pub async fn run(
    repayments: Arc<RepaymentService>,
    otp: Arc<OtpService>,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "starting maintenance loop");

    loop {
        tokio::time::sleep(interval).await;

        if let Err(e) = tick(&repayments, &otp).await {
            tracing::error!(component = e.component(), error = %e, "maintenance pass failed");
        }
    }
}

/// A single maintenance pass.
pub async fn tick(repayments: &RepaymentService, otp: &OtpService) -> CoreResult<()> {
    let purged = otp.cleanup_expired().await?;
    let overdue = repayments.mark_overdue_repayments().await?;

    if purged > 0 || overdue > 0 {
        tracing::info!(purged, overdue, "maintenance pass complete");
    }

    Ok(())
}

//! SolarVest maintenance worker
//!
//! Long-running process that sweeps stale OTP codes and flags overdue
//! repayments on a fixed interval. The HTTP API layer lives elsewhere and
//! consumes this crate as a library.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;

use solarvest_core::adapters::PostgresStore;
use solarvest_core::clock::SystemClock;
use solarvest_core::config::Config;
use solarvest_core::mailer::HttpMailer;
use solarvest_core::maintenance;
use solarvest_core::otp::{FixedWindowLimiter, OtpConfig, OtpService};
use solarvest_core::repayment::RepaymentService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        database = %config.database_url_masked(),
        "starting maintenance worker"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Database connected successfully");

    let store = Arc::new(PostgresStore::new(db_pool));
    let clock = Arc::new(SystemClock);

    let repayments = Arc::new(RepaymentService::new(
        store.clone(),
        clock.clone(),
        config.late_fee_percent,
    ));

    let mailer = Arc::new(HttpMailer::new(
        config.mail_api_url.clone(),
        config.mail_api_key.clone(),
        config.mail_from.clone(),
        config.otp_validity_minutes,
    ));
    let limiter = Arc::new(FixedWindowLimiter::new(clock.clone()));

    let mut otp_config = OtpConfig::new(config.jwt_secret.clone(), config.session_ttl_seconds);
    otp_config.validity_minutes = config.otp_validity_minutes;
    otp_config.max_attempts = config.otp_max_attempts;
    otp_config.max_sends_per_hour = config.otp_max_sends_per_hour;

    let otp = Arc::new(OtpService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        mailer,
        limiter,
        clock,
        otp_config,
    ));

    let interval = Duration::from_secs(config.maintenance_interval_seconds);
    let maintenance_task = tokio::spawn(maintenance::run(repayments, otp, interval));

    shutdown_signal().await;
    maintenance_task.abort();

    tracing::info!("Maintenance worker shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

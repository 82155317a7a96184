//! Centralized error handling for SolarVest
//!
//! Component errors stay in their modules; this type aggregates them for
//! callers that drive several components at once (the maintenance worker,
//! an embedding API layer).

use thiserror::Error;

use crate::auth::jwt::JwtError;
use crate::config::ConfigError;
use crate::mailer::MailError;
use crate::otp::OtpError;
use crate::ports::StoreError;
use crate::repayment::RepaymentError;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Repayment(#[from] RepaymentError),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Component name for structured log fields.
    pub fn component(&self) -> &'static str {
        match self {
            CoreError::Repayment(_) => "repayment",
            CoreError::Otp(_) => "otp",
            CoreError::Store(_) => "store",
            CoreError::Mail(_) => "mail",
            CoreError::Token(_) => "token",
            CoreError::Config(_) => "config",
        }
    }
}

/// Result type alias using CoreError
pub type CoreResult<T> = Result<T, CoreError>;

//! OTP authentication protocol
//!
//! [`rate_limiter`] bounds how often codes can be requested per email;
//! [`service`] owns the send/verify/cleanup state machine.

pub mod rate_limiter;
pub mod service;

pub use rate_limiter::{FixedWindowLimiter, RateLimiter};
pub use service::{OtpConfig, OtpError, OtpService};

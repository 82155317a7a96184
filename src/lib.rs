//! SolarVest Platform Core Library
//!
//! Domain core of the SolarVest solar-investment platform: the repayment
//! schedule engine and the OTP authentication protocol, with the store,
//! mail, and rate-limit boundaries they depend on.

pub mod adapters;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod mailer;
pub mod maintenance;
pub mod models;
pub mod otp;
pub mod ports;
pub mod repayment;

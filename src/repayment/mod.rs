//! Repayment schedule engine
//!
//! Pure amortization math lives in [`calculator`]; [`service`] wires it to
//! the investment store and owns the schedule lifecycle.

pub mod calculator;
pub mod service;

pub use service::{RepaymentError, RepaymentService};

//! Session token support for the OTP login flow
//!
//! JWT generation and validation plus the hashing used to store issued
//! tokens. The login protocol itself lives in [`crate::otp`].

pub mod jwt;

pub use jwt::{generate_session_token, hash_token, verify_token, Claims, JwtError};

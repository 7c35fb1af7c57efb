//! End-to-end test suite for Tally.
//!
//! Wallets are built from fixtures, submitted over real HTTP to an
//! in-process verifier, and tracked to confirmation.
pub mod helpers;
pub mod verifier;

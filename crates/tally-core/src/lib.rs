//! # tally-core
//! Foundation types, canonical encoding, hashing and signing for Tally.
//!
//! # Modules
//!
//! - [`amount`] — fixed-point amounts and ratios
//! - [`types`] — outputs, inputs, credentials, transactions, spendable units
//! - [`canonical`] — byte-exact encoding shared with the verifier
//! - [`hash`] — output, transaction and credential hashes
//! - [`crypto`] — P-256 keys and prehash signing
//! - [`constants`] — protocol constants
//! - [`error`] — core error enums

pub mod amount;
pub mod canonical;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

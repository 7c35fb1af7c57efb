//! # tally-wallet — selection, assembly and signing of transactions.
//!
//! Turns a [`TransferRequest`] plus read-only wallet state into a signed
//! submission [`Envelope`]. Keys come from a [`KeyProvider`] on demand;
//! units reserved by earlier submissions are skipped through [`UnitLocks`].
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`state`] — wallet state and lock traits, in-memory implementations
//! - [`keys`] — key provider trait and in-memory key ring
//! - [`coin_selection`] — greedy per-class selection with credentials
//! - [`params`] — transfer requests and legacy adapters
//! - [`envelope`] — individual and aggregate envelopes
//! - [`builder`] — transaction assembly and signing

pub mod builder;
pub mod coin_selection;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod params;
pub mod state;

// Re-exports for convenient access
pub use builder::{BuildOutcome, TransactionBuilder};
pub use coin_selection::{CoinSelector, CredentialPolicy, Selection, SelectionMode};
pub use envelope::{AggregateEnvelope, Envelope, IndividualEnvelope, aggregate_hash};
pub use error::{CrossDomainViolation, KeyRole, WalletError};
pub use keys::{KeyError, KeyProvider, KeyRing};
pub use params::{
    LegacyBillTransfer, LegacySingleTransfer, Recipient, TransferKind, TransferRequest,
    from_legacy_bill, from_legacy_single,
};
pub use state::{
    AddressInfo, AddressRecord, InFlightLocks, Membership, MemoryWallet, NoLocks, UnitLocks,
    WalletState,
};

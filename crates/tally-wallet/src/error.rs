//! Wallet error types.

use std::fmt;

use tally_core::amount::Amount;
use tally_core::error::{AmountError, CryptoError, EncodeError};
use tally_core::types::AssetClass;
use thiserror::Error;

/// Which signature a requested key was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Signs an input over the spent output's hash.
    Input,
    /// Recipient signature on a credential.
    Credential,
    /// Whole-transaction signature.
    Transaction,
    /// Account-level signature on an individual envelope.
    Submitter,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Credential => "credential",
            Self::Transaction => "transaction",
            Self::Submitter => "submitter",
        };
        f.write_str(name)
    }
}

/// A rule broken by a cross-domain transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossDomainViolation {
    /// Exactly one recipient is allowed.
    RecipientCount(usize),
    /// Only the primary class may cross domains.
    NonPrimaryClass(AssetClass),
    /// At most one change address is allowed.
    ChangeAddressCount(usize),
    /// Credentials can never settle a cross-domain transfer.
    CredentialsRequested,
}

impl fmt::Display for CrossDomainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecipientCount(n) => write!(f, "exactly one recipient required, got {n}"),
            Self::NonPrimaryClass(class) => write!(f, "asset class {class} cannot cross domains"),
            Self::ChangeAddressCount(n) => write!(f, "at most one change address allowed, got {n}"),
            Self::CredentialsRequested => f.write_str("credentials cannot be used"),
        }
    }
}

/// Errors that can occur while selecting, assembling or signing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A cross-domain request broke one of its constraints.
    #[error("cross-domain transfer: {0}")]
    CrossDomain(CrossDomainViolation),

    /// A recipient or change address has no known public key.
    #[error("missing public key for address {0}")]
    MissingPublicKey(String),

    /// Change is due in a class with no declared change address.
    #[error("no change address declared for asset class {0}")]
    UnmatchedChangeClass(AssetClass),

    /// Selected value cannot cover the requirement of one class.
    #[error("insufficient balance in asset class {class}: required {required}, available {available}")]
    InsufficientBalance {
        /// Class that came up short.
        class: AssetClass,
        /// Value needed in that class.
        required: Amount,
        /// Value the wallet could select.
        available: Amount,
    },

    /// A unit's prior-output data does not back the unit.
    #[error("incomplete wallet data for unit {unit}: {detail}")]
    IncompleteWalletData {
        /// The unit reference, `tx@block.major.minor:index`.
        unit: String,
        /// What is wrong with the data.
        detail: String,
    },

    /// The key provider could not produce a key.
    #[error("{role} key unavailable for {id}")]
    KeyUnavailable {
        /// What the key was needed for.
        role: KeyRole,
        /// Address or account the key belongs to.
        id: String,
    },

    /// The key provider's prompt was cancelled by the user.
    #[error("{role} key request for {id} was cancelled")]
    KeyCancelled {
        /// What the key was needed for.
        role: KeyRole,
        /// Address or account the key belongs to.
        id: String,
    },

    /// A provided key does not match the address's public key.
    #[error("key for {0} does not match its public key")]
    KeyMismatch(String),

    /// Cryptographic error from tally-core.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Encoding error from tally-core.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Amount parse error from tally-core.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl WalletError {
    /// The shortfall of an [`WalletError::InsufficientBalance`] error.
    pub fn shortfall(&self) -> Option<Amount> {
        match self {
            Self::InsufficientBalance {
                required,
                available,
                ..
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }

    /// Whether the user cancelled a key prompt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::KeyCancelled { .. })
    }
}

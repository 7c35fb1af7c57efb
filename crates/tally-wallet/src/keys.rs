//! Signing key providers.
//!
//! The assembler never holds keys of its own. Every secret scalar is
//! requested from a [`KeyProvider`] when a signature is due, which lets an
//! interactive provider prompt (and the user cancel) mid-build.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use tally_core::crypto::{KeyPair, SecretScalar};
use tally_core::types::PublicKeyCoords;

use crate::error::{KeyRole, WalletError};

/// Why a provider could not produce a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("no key for {0}")]
    Missing(String),
    #[error("key request cancelled")]
    Cancelled,
    #[error("invalid key material: {0}")]
    Invalid(String),
}

impl KeyError {
    /// Attach the role and owner the key was requested for.
    pub fn into_wallet_error(self, role: KeyRole, id: &str) -> WalletError {
        match self {
            Self::Cancelled => WalletError::KeyCancelled {
                role,
                id: id.to_string(),
            },
            Self::Missing(_) | Self::Invalid(_) => WalletError::KeyUnavailable {
                role,
                id: id.to_string(),
            },
        }
    }
}

/// Source of raw private scalars.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Key controlling a wallet address.
    async fn address_key(&self, address: &str) -> Result<SecretScalar, KeyError>;

    /// Account-level key used for submitter signatures.
    async fn account_key(&self, account: &str) -> Result<SecretScalar, KeyError>;
}

/// In-memory key provider.
#[derive(Default)]
pub struct KeyRing {
    addresses: HashMap<String, SecretScalar>,
    accounts: HashMap<String, SecretScalar>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key of an address.
    pub fn insert_address(&mut self, address: impl Into<String>, secret: SecretScalar) {
        self.addresses.insert(address.into(), secret);
    }

    /// Register an account-level key.
    pub fn insert_account(&mut self, account: impl Into<String>, secret: SecretScalar) {
        self.accounts.insert(account.into(), secret);
    }

    /// Generate and register a fresh key for an address, returning its
    /// public key.
    pub fn generate_address(
        &mut self,
        address: impl Into<String>,
    ) -> Result<PublicKeyCoords, WalletError> {
        let secret = SecretScalar::generate();
        let public_key = KeyPair::from_secret(&secret)?.public_key()?;
        self.insert_address(address, secret);
        Ok(public_key)
    }

    /// Generate and register a fresh account key.
    pub fn generate_account(
        &mut self,
        account: impl Into<String>,
    ) -> Result<PublicKeyCoords, WalletError> {
        let secret = SecretScalar::generate();
        let public_key = KeyPair::from_secret(&secret)?.public_key()?;
        self.insert_account(account, secret);
        Ok(public_key)
    }

    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut addresses: Vec<_> = self.addresses.keys().collect();
        addresses.sort();
        let mut accounts: Vec<_> = self.accounts.keys().collect();
        accounts.sort();
        f.debug_struct("KeyRing")
            .field("addresses", &addresses)
            .field("accounts", &accounts)
            .finish()
    }
}

#[async_trait]
impl KeyProvider for KeyRing {
    async fn address_key(&self, address: &str) -> Result<SecretScalar, KeyError> {
        self.addresses
            .get(address)
            .cloned()
            .ok_or_else(|| KeyError::Missing(address.to_string()))
    }

    async fn account_key(&self, account: &str) -> Result<SecretScalar, KeyError> {
        self.accounts
            .get(account)
            .cloned()
            .ok_or_else(|| KeyError::Missing(account.to_string()))
    }
}

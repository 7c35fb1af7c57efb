//! Key sources for the CLI: a JSON key file or interactive prompts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tally_core::crypto::SecretScalar;
use tally_wallet::{KeyError, KeyProvider, KeyRing};
use zeroize::Zeroizing;

/// Hex scalars by address and by account. Zeroized on drop.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct KeyFile {
    pub addresses: BTreeMap<String, Zeroizing<String>>,
    pub accounts: BTreeMap<String, Zeroizing<String>>,
}

impl KeyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid key file: {}", path.display()))
    }

    pub fn into_ring(self) -> Result<KeyRing> {
        let mut ring = KeyRing::new();
        for (address, hex) in self.addresses {
            let secret = SecretScalar::from_hex(&hex)
                .with_context(|| format!("Invalid key for address {address}"))?;
            ring.insert_address(address, secret);
        }
        for (account, hex) in self.accounts {
            let secret = SecretScalar::from_hex(&hex)
                .with_context(|| format!("Invalid key for account {account}"))?;
            ring.insert_account(account, secret);
        }
        Ok(ring)
    }
}

impl fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFile")
            .field("addresses", &self.addresses.keys().collect::<Vec<_>>())
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Prompts on the terminal for each key. An empty entry cancels the build.
#[derive(Debug, Default)]
pub struct PromptKeys;

impl PromptKeys {
    async fn prompt(label: String) -> Result<SecretScalar, KeyError> {
        let entered = tokio::task::spawn_blocking(move || {
            rpassword::prompt_password(label).map(Zeroizing::new)
        })
        .await
        .map_err(|e| KeyError::Invalid(e.to_string()))?
        .map_err(|e| KeyError::Invalid(e.to_string()))?;
        parse_entry(&entered)
    }
}

fn parse_entry(entered: &str) -> Result<SecretScalar, KeyError> {
    if entered.trim().is_empty() {
        return Err(KeyError::Cancelled);
    }
    SecretScalar::from_hex(entered).map_err(|e| KeyError::Invalid(e.to_string()))
}

#[async_trait]
impl KeyProvider for PromptKeys {
    async fn address_key(&self, address: &str) -> Result<SecretScalar, KeyError> {
        Self::prompt(format!("Private key for address {address} (empty to cancel): ")).await
    }

    async fn account_key(&self, account: &str) -> Result<SecretScalar, KeyError> {
        Self::prompt(format!("Account key for {account} (empty to cancel): ")).await
    }
}

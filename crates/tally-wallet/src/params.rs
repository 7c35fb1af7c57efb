//! Transfer requests.
//!
//! [`TransferRequest`] is the one shape the assembler accepts. Older
//! request shapes are normalized into it by [`from_legacy_single`] and
//! [`from_legacy_bill`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tally_core::amount::{Amount, Fixed, Ratio};
use tally_core::canonical::base64_bytes;
use tally_core::types::{AssetClass, PublicKeyCoords};

use crate::error::WalletError;

/// One payment of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub address: String,
    pub amount: Amount,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub public_key: Option<PublicKeyCoords>,
}

impl Recipient {
    pub fn new(
        address: impl Into<String>,
        amount: Amount,
        asset_class: AssetClass,
        public_key: PublicKeyCoords,
    ) -> Self {
        Self {
            address: address.into(),
            amount,
            asset_class,
            public_key: Some(public_key),
        }
    }
}

/// Kind of transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    #[default]
    Standard,
    /// Moves primary-class value to another domain.
    CrossDomain,
    /// Pledge; credentials are never used.
    Pledge,
}

/// Canonical transfer request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferRequest {
    /// Addresses to spend from, in preference order. Empty means every
    /// wallet address.
    pub from_addresses: Vec<String>,
    pub recipients: Vec<Recipient>,
    /// Change addresses; at most one is used per asset class.
    pub change_addresses: Vec<String>,
    pub kind: TransferKind,
    /// Primary-class amount converted to fees.
    pub fee_conversion: Option<Amount>,
    /// Interest (gas) amount carried by the transaction.
    pub interest: Amount,
    /// Share of the interest allocated to recipient outputs.
    pub interest_output_share: Ratio,
    /// Restricts credential supplementation to these ids when non-empty.
    pub credential_ids: Vec<String>,
    /// Never supplement with credentials.
    pub no_credentials: bool,
    /// Sequence number written into an individual envelope.
    pub height: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl TransferRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requested per asset class, fee conversion included.
    pub fn required_by_class(&self) -> Result<BTreeMap<AssetClass, Amount>, WalletError> {
        let overflow = || WalletError::InvalidAmount("requested total overflows".into());
        let mut required: BTreeMap<AssetClass, Amount> = BTreeMap::new();
        for r in &self.recipients {
            let slot = required.entry(r.asset_class).or_insert(Fixed::ZERO);
            *slot = slot.checked_add(r.amount).ok_or_else(overflow)?;
        }
        if let Some(fee) = self.fee_conversion {
            let slot = required.entry(AssetClass::Primary).or_insert(Fixed::ZERO);
            *slot = slot.checked_add(fee).ok_or_else(overflow)?;
        }
        Ok(required)
    }
}

/// Older single-recipient request shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySingleTransfer {
    pub from: Vec<String>,
    pub to: String,
    #[serde(default)]
    pub to_public_key: Option<PublicKeyCoords>,
    /// Decimal amount string.
    pub amount: String,
    pub coin_type: u8,
    #[serde(default)]
    pub change: Option<String>,
    #[serde(default)]
    pub gas_fee: Option<String>,
}

/// Older bill-style shape: address to amount, plus a declared total.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBillTransfer {
    pub from: Vec<String>,
    pub bill: BTreeMap<String, String>,
    #[serde(default)]
    pub public_keys: BTreeMap<String, PublicKeyCoords>,
    pub total: String,
    pub coin_type: u8,
    #[serde(default)]
    pub change: Vec<String>,
}

fn legacy_class(code: u8) -> Result<AssetClass, WalletError> {
    AssetClass::from_code(code)
        .ok_or_else(|| WalletError::InvalidInput(format!("unknown coin type {code}")))
}

fn legacy_amount(text: &str) -> Result<Amount, WalletError> {
    Ok(text.parse::<Fixed>()?)
}

/// Normalize a single-recipient request.
pub fn from_legacy_single(legacy: LegacySingleTransfer) -> Result<TransferRequest, WalletError> {
    let asset_class = legacy_class(legacy.coin_type)?;
    let fee_conversion = match legacy.gas_fee.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(fee) => Some(legacy_amount(fee)?).filter(|f| !f.is_zero()),
    };
    Ok(TransferRequest {
        from_addresses: legacy.from,
        recipients: vec![Recipient {
            address: legacy.to,
            amount: legacy_amount(&legacy.amount)?,
            asset_class,
            public_key: legacy.to_public_key,
        }],
        change_addresses: legacy.change.into_iter().collect(),
        fee_conversion,
        ..TransferRequest::default()
    })
}

/// Normalize a bill-style request. The bill must add up to its total.
pub fn from_legacy_bill(legacy: LegacyBillTransfer) -> Result<TransferRequest, WalletError> {
    let asset_class = legacy_class(legacy.coin_type)?;
    let declared = legacy_amount(&legacy.total)?;

    let mut recipients = Vec::with_capacity(legacy.bill.len());
    for (address, amount) in &legacy.bill {
        recipients.push(Recipient {
            address: address.clone(),
            amount: legacy_amount(amount)?,
            asset_class,
            public_key: legacy.public_keys.get(address).cloned(),
        });
    }
    let sum = Fixed::checked_sum(recipients.iter().map(|r| r.amount))
        .ok_or_else(|| WalletError::InvalidAmount("bill total overflows".into()))?;
    if sum != declared {
        return Err(WalletError::InvalidInput(format!(
            "bill adds up to {sum} but declares {declared}"
        )));
    }

    Ok(TransferRequest {
        from_addresses: legacy.from,
        recipients,
        change_addresses: legacy.change,
        ..TransferRequest::default()
    })
}

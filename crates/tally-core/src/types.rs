//! Core wire types: outputs, inputs, credentials, transactions.
//!
//! Field declaration order is the wire order (see [`crate::canonical`]).
//! Do not reorder fields in the `PascalCase` structs below.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::amount::{Amount, Fixed, Ratio};
use crate::canonical::{NumberPair, base64_bytes, big_uint, null_pair};

/// Asset class of a value. Encoded on the wire as a bare integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetClass {
    /// Class 0, the only class credentials may settle.
    Primary,
    Secondary,
    Tertiary,
}

impl AssetClass {
    pub const ALL: [Self; 3] = [Self::Primary, Self::Secondary, Self::Tertiary];

    pub fn code(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Tertiary => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Primary),
            1 => Some(Self::Secondary),
            2 => Some(Self::Tertiary),
            _ => None,
        }
    }

    /// Key used for this class in value-by-class maps.
    pub fn map_key(self) -> String {
        self.code().to_string()
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for AssetClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for AssetClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown asset class {code}")))
    }
}

/// Transaction type code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TxType {
    #[default]
    Plain,
    CredentialAssisted,
    CrossDomain,
    Retail,
}

impl TxType {
    pub fn code(self) -> u8 {
        match self {
            Self::Plain => 0,
            Self::CredentialAssisted => 1,
            Self::CrossDomain => 2,
            Self::Retail => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Plain),
            1 => Some(Self::CredentialAssisted),
            2 => Some(Self::CrossDomain),
            3 => Some(Self::Retail),
            _ => None,
        }
    }
}

impl Serialize for TxType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TxType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown transaction type {code}")))
    }
}

/// Affine P-256 public key coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyCoords {
    #[serde(rename = "X", with = "big_uint")]
    pub x: BigUint,
    #[serde(rename = "Y", with = "big_uint")]
    pub y: BigUint,
}

impl NumberPair for PublicKeyCoords {
    const FIRST: &'static str = "X";
    const SECOND: &'static str = "Y";

    fn parts(&self) -> (&BigUint, &BigUint) {
        (&self.x, &self.y)
    }

    fn from_parts(x: BigUint, y: BigUint) -> Self {
        Self { x, y }
    }
}

/// ECDSA signature components.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcdsaSignature {
    #[serde(rename = "R", with = "big_uint")]
    pub r: BigUint,
    #[serde(rename = "S", with = "big_uint")]
    pub s: BigUint,
}

impl NumberPair for EcdsaSignature {
    const FIRST: &'static str = "R";
    const SECOND: &'static str = "S";

    fn parts(&self) -> (&BigUint, &BigUint) {
        (&self.r, &self.s)
    }

    fn from_parts(r: BigUint, s: BigUint) -> Self {
        Self { r, s }
    }
}

/// Location of an output on the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockPosition {
    pub block: u64,
    pub major_index: u32,
    pub minor_index: u32,
    /// Index into the originating transaction's output list.
    pub output_index: u32,
}

/// Identifies a spendable unit: originating transaction plus position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub origin_tx_id: String,
    pub position: BlockPosition,
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.position;
        write!(
            f,
            "{}@{}.{}.{}:{}",
            self.origin_tx_id, p.block, p.major_index, p.minor_index, p.output_index
        )
    }
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Destination address; empty for a fee-conversion pseudo-output.
    pub to_address: String,
    pub value: Amount,
    pub asset_class: AssetClass,
    #[serde(with = "null_pair")]
    pub to_public_key: Option<PublicKeyCoords>,
    /// Interest allocated to this output.
    pub interest: Amount,
    pub is_fee_conversion: bool,
    pub is_cross_domain: bool,
    pub is_issuer_made: bool,
}

impl Output {
    /// A plain payment output.
    pub fn payment(
        to_address: impl Into<String>,
        value: Amount,
        asset_class: AssetClass,
        to_public_key: PublicKeyCoords,
    ) -> Self {
        Self {
            to_address: to_address.into(),
            value,
            asset_class,
            to_public_key: Some(to_public_key),
            interest: Fixed::ZERO,
            is_fee_conversion: false,
            is_cross_domain: false,
            is_issuer_made: false,
        }
    }

    /// A fee-conversion pseudo-output of the primary class.
    pub fn fee_conversion(value: Amount) -> Self {
        Self {
            to_address: String::new(),
            value,
            asset_class: AssetClass::Primary,
            to_public_key: None,
            interest: Fixed::ZERO,
            is_fee_conversion: true,
            is_cross_domain: false,
            is_issuer_made: false,
        }
    }
}

/// A transaction input spending a prior output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Input {
    pub from_tx_id: String,
    pub from_position: BlockPosition,
    /// Address that owned the spent output and signs this input.
    pub from_address: String,
    pub is_credential_derived: bool,
    pub is_issuer_made: bool,
    /// `output_hash` of the referenced prior output.
    #[serde(with = "base64_bytes")]
    pub output_hash: Vec<u8>,
    /// Signature over `output_hash`, not over the transaction.
    #[serde(with = "null_pair")]
    pub signature: Option<EcdsaSignature>,
}

/// A pre-issued, recipient-locked promise of primary-class value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credential {
    pub id: String,
    /// Issuing guarantor.
    pub issuer: String,
    pub recipient: String,
    pub value: Amount,
    pub issue_height: u64,
    #[serde(with = "null_pair")]
    pub issuer_signature: Option<EcdsaSignature>,
    #[serde(with = "null_pair")]
    pub recipient_signature: Option<EcdsaSignature>,
}

/// Interest (fee-like value) assignment of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterestAssignment {
    pub amount: Amount,
    /// Share of `amount` allocated to recipient outputs.
    pub output_share: Ratio,
    /// Contributing address -> ratio. Ratios sum to exactly [`Fixed::ONE`].
    pub back_assignment: BTreeMap<String, Ratio>,
}

/// A transaction as submitted to the verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    /// Derived from the transaction hash, see [`crate::hash::derive_tx_id`].
    pub tx_id: String,
    /// Canonical encoded size in bytes.
    pub size: u64,
    pub version: u32,
    pub group_id: String,
    pub tx_type: TxType,
    pub value: Amount,
    /// Asset class key -> value moved in that class.
    pub value_by_class: BTreeMap<String, Amount>,
    pub interest: InterestAssignment,
    pub inputs: Vec<Input>,
    pub credential_inputs: Vec<Credential>,
    pub outputs: Vec<Output>,
    #[serde(with = "null_pair")]
    pub signature: Option<EcdsaSignature>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Transaction {
    /// Value recorded for an asset class, zero when absent.
    pub fn class_value(&self, class: AssetClass) -> Amount {
        self.value_by_class
            .get(&class.map_key())
            .copied()
            .unwrap_or(Fixed::ZERO)
    }

    /// Sum of output values of one class. `None` on overflow.
    pub fn output_total(&self, class: AssetClass) -> Option<Amount> {
        Fixed::checked_sum(
            self.outputs
                .iter()
                .filter(|o| o.asset_class == class)
                .map(|o| o.value),
        )
    }
}

/// An unspent prior output owned by the wallet.
///
/// Carries the full output list of the originating transaction so the exact
/// bytes that were hashed can be rebuilt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableUnit {
    pub unit_ref: UnitRef,
    pub owner: String,
    pub value: Amount,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub credential_derived: bool,
    pub prior_outputs: Vec<Output>,
}

impl SpendableUnit {
    /// The prior output this unit refers to, if the index resolves.
    pub fn referenced_output(&self) -> Option<&Output> {
        self.prior_outputs
            .get(self.unit_ref.position.output_index as usize)
    }
}

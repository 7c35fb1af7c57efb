//! Submission envelopes.
//!
//! Group members submit one transaction at a time in an
//! [`IndividualEnvelope`] signed with their account key. Retail submitters
//! wrap transactions in an [`AggregateEnvelope`] whose integrity comes from
//! the aggregate hash alone.

use serde::{Deserialize, Serialize};

use tally_core::canonical::{self, base64_bytes, null_pair};
use tally_core::crypto::verify_hash;
use tally_core::error::{CryptoError, EncodeError};
use tally_core::hash::{Hash256, hash_canonical};
use tally_core::types::{EcdsaSignature, PublicKeyCoords, Transaction};

/// One transaction submitted by a guarantor-group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndividualEnvelope {
    pub transaction: Transaction,
    /// Submitting account.
    pub submitter: String,
    pub group_id: String,
    pub height: u64,
    #[serde(with = "null_pair")]
    pub signature: Option<EcdsaSignature>,
}

impl IndividualEnvelope {
    pub fn new(transaction: Transaction, submitter: String, group_id: String, height: u64) -> Self {
        Self {
            transaction,
            submitter,
            group_id,
            height,
            signature: None,
        }
    }

    /// Hash signed by the submitter: signature nulled, height zeroed.
    pub fn signing_hash(&self) -> Result<Hash256, EncodeError> {
        let mut view = self.clone();
        view.signature = None;
        view.height = 0;
        hash_canonical(&view)
    }

    /// Check the submitter signature against an account public key.
    pub fn verify(&self, account_key: &PublicKeyCoords) -> Result<(), CryptoError> {
        let signature = self.signature.as_ref().ok_or(CryptoError::InvalidSignature)?;
        let hash = self
            .signing_hash()
            .map_err(|_| CryptoError::InvalidSignature)?;
        verify_hash(account_key, &hash, signature)
    }
}

/// Hash over the canonical encoding of a transaction list.
pub fn aggregate_hash(transactions: &[Transaction]) -> Result<Hash256, EncodeError> {
    hash_canonical(transactions)
}

/// One or more retail transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregateEnvelope {
    pub transactions: Vec<Transaction>,
    #[serde(with = "base64_bytes")]
    pub aggregate_hash: Vec<u8>,
    #[serde(with = "null_pair")]
    pub group_signature: Option<EcdsaSignature>,
}

impl AggregateEnvelope {
    /// Wrap transactions and compute their aggregate hash.
    pub fn new(transactions: Vec<Transaction>) -> Result<Self, EncodeError> {
        let hash = aggregate_hash(&transactions)?;
        Ok(Self {
            transactions,
            aggregate_hash: hash.to_vec(),
            group_signature: None,
        })
    }

    /// Whether the stored aggregate hash matches the transactions.
    pub fn hash_matches(&self) -> Result<bool, EncodeError> {
        Ok(aggregate_hash(&self.transactions)?.as_bytes().as_slice() == self.aggregate_hash.as_slice())
    }
}

/// The outermost structure handed to the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Individual(IndividualEnvelope),
    Aggregate(AggregateEnvelope),
}

impl Envelope {
    /// Canonical bytes as submitted.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        canonical::encode(self)
    }

    /// Decode either envelope shape.
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodeError> {
        match canonical::decode::<IndividualEnvelope>(bytes) {
            Ok(individual) => Ok(Self::Individual(individual)),
            Err(_) => canonical::decode::<AggregateEnvelope>(bytes).map(Self::Aggregate),
        }
    }

    pub fn transactions(&self) -> Vec<&Transaction> {
        match self {
            Self::Individual(e) => vec![&e.transaction],
            Self::Aggregate(e) => e.transactions.iter().collect(),
        }
    }

    /// Group id for an individual envelope; `None` for retail.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Individual(e) => Some(&e.group_id),
            Self::Aggregate(_) => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }
}

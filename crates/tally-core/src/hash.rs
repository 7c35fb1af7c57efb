//! Domain hashes over canonical encodings.
//!
//! Each hash is SHA-256 over [`canonical::encode`] of a *derived* value:
//!
//! - [`output_hash`] — the output as-is. Inputs sign this for the output
//!   they spend.
//! - [`transaction_hash`] — the [`signing_view`] of a transaction. Both the
//!   transaction id and the whole-transaction signature use this one view.
//! - [`credential_hash`] — the credential with both signature slots nulled.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::canonical;
use crate::constants::TXID_PREFIX_LEN;
use crate::error::EncodeError;
use crate::types::{Credential, Output, Transaction, TxType};

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 of raw bytes.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

/// SHA-256 of the canonical encoding of any value.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<Hash256, EncodeError> {
    Ok(sha256(&canonical::encode(value)?))
}

/// Hash of an output, encoded without any field exclusion.
pub fn output_hash(output: &Output) -> Result<Hash256, EncodeError> {
    hash_canonical(output)
}

/// The value actually hashed for a transaction.
///
/// Issuer-made inputs and outputs are removed; id, size, signature and type
/// code are zeroed but kept; zero-valued entries of the value-by-class map
/// are removed. The verifier derives the same view for both the id and the
/// signature check.
pub fn signing_view(tx: &Transaction) -> Transaction {
    let mut view = tx.clone();
    view.inputs.retain(|i| !i.is_issuer_made);
    view.outputs.retain(|o| !o.is_issuer_made);
    view.tx_id = String::new();
    view.size = 0;
    view.signature = None;
    view.tx_type = TxType::Plain;
    view.value_by_class.retain(|_, v| !v.is_zero());
    view
}

/// Hash signed by the whole-transaction signature.
pub fn transaction_hash(tx: &Transaction) -> Result<Hash256, EncodeError> {
    hash_canonical(&signing_view(tx))
}

/// Transaction id: lowercase hex of the first 8 bytes of the transaction hash.
pub fn derive_tx_id(tx_hash: &Hash256) -> String {
    hex::encode(&tx_hash.0[..TXID_PREFIX_LEN])
}

/// Compute the id a transaction should carry.
pub fn tx_id(tx: &Transaction) -> Result<String, EncodeError> {
    Ok(derive_tx_id(&transaction_hash(tx)?))
}

/// Hash of a credential with both signature slots nulled.
pub fn credential_hash(credential: &Credential) -> Result<Hash256, EncodeError> {
    let mut view = credential.clone();
    view.issuer_signature = None;
    view.recipient_signature = None;
    hash_canonical(&view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Fixed;
    use crate::types::{
        AssetClass, BlockPosition, EcdsaSignature, Input, InterestAssignment, PublicKeyCoords,
    };
    use num_bigint::BigUint;
    use std::collections::BTreeMap;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn key() -> PublicKeyCoords {
        PublicKeyCoords {
            x: BigUint::from(7u8),
            y: BigUint::from(9u8),
        }
    }

    fn sig() -> EcdsaSignature {
        EcdsaSignature {
            r: BigUint::from(5u8),
            s: BigUint::from(6u8),
        }
    }

    fn input(address: &str) -> Input {
        Input {
            from_tx_id: "aa".into(),
            from_position: BlockPosition::default(),
            from_address: address.into(),
            is_credential_derived: false,
            is_issuer_made: false,
            output_hash: vec![1; 32],
            signature: Some(sig()),
        }
    }

    fn sample_tx() -> Transaction {
        Transaction {
            tx_id: String::new(),
            size: 0,
            version: 1,
            group_id: "g1".into(),
            tx_type: TxType::Plain,
            value: fx("10"),
            value_by_class: BTreeMap::from([("0".to_string(), fx("10"))]),
            interest: InterestAssignment {
                amount: Fixed::ZERO,
                output_share: Fixed::ONE,
                back_assignment: BTreeMap::from([("a".to_string(), Fixed::ONE)]),
            },
            inputs: vec![input("a")],
            credential_inputs: vec![],
            outputs: vec![Output::payment("b", fx("10"), AssetClass::Primary, key())],
            signature: None,
            data: vec![],
        }
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tx_id_is_hex_of_first_eight_hash_bytes() {
        let tx = sample_tx();
        let h = transaction_hash(&tx).unwrap();
        let id = tx_id(&tx).unwrap();
        assert_eq!(id.len(), 16);
        assert_eq!(id, hex::encode(&h.as_bytes()[..8]));
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn zero_map_entry_hashes_like_absent_entry() {
        let absent = sample_tx();
        let mut zeroed = sample_tx();
        zeroed.value_by_class.insert("1".into(), Fixed::ZERO);
        zeroed.value_by_class.insert("2".into(), Fixed::ZERO);
        assert_eq!(
            transaction_hash(&absent).unwrap(),
            transaction_hash(&zeroed).unwrap()
        );
        // Encoded as-is, the two differ; only the hashing view drops zeros.
        assert_ne!(
            canonical::encode(&absent).unwrap(),
            canonical::encode(&zeroed).unwrap()
        );
    }

    #[test]
    fn zeroed_fields_do_not_affect_hash() {
        let base = sample_tx();
        let mut filled = sample_tx();
        filled.tx_id = "0123456789abcdef".into();
        filled.size = 999;
        filled.signature = Some(sig());
        filled.tx_type = TxType::Retail;
        assert_eq!(
            transaction_hash(&base).unwrap(),
            transaction_hash(&filled).unwrap()
        );
    }

    #[test]
    fn zeroed_fields_are_kept_not_removed() {
        let view = signing_view(&sample_tx());
        let text = canonical::encode_string(&view).unwrap();
        assert!(text.starts_with(r#"{"TxId":"","Size":0,"Version":1"#));
        assert!(text.contains(r#""TxType":0"#));
        assert!(text.contains(r#""Signature":{"R":null,"S":null}"#));
    }

    #[test]
    fn id_and_signature_share_one_view() {
        // The id is a prefix of exactly the hash the whole-transaction
        // signature covers, including after the id itself is filled in.
        let mut tx = sample_tx();
        tx.value_by_class.insert("2".into(), Fixed::ZERO);
        let before = transaction_hash(&tx).unwrap();
        tx.tx_id = derive_tx_id(&before);
        let after = transaction_hash(&tx).unwrap();
        assert_eq!(before, after);
        assert!(after.to_string().starts_with(&tx.tx_id));
    }

    #[test]
    fn issuer_made_entries_are_filtered() {
        let base = sample_tx();
        let mut extra = sample_tx();
        let mut issuer_in = input("issuer");
        issuer_in.is_issuer_made = true;
        extra.inputs.push(issuer_in);
        let mut issuer_out = Output::payment("issuer", fx("1"), AssetClass::Primary, key());
        issuer_out.is_issuer_made = true;
        extra.outputs.push(issuer_out);
        assert_eq!(
            transaction_hash(&base).unwrap(),
            transaction_hash(&extra).unwrap()
        );
    }

    #[test]
    fn content_changes_change_hash() {
        let base = sample_tx();
        let mut other = sample_tx();
        other.outputs[0].value = fx("9");
        assert_ne!(
            transaction_hash(&base).unwrap(),
            transaction_hash(&other).unwrap()
        );
    }

    #[test]
    fn back_assignment_order_does_not_matter() {
        let mut a = sample_tx();
        let mut b = sample_tx();
        a.interest.back_assignment.clear();
        b.interest.back_assignment.clear();
        for k in ["x", "m", "c"] {
            a.interest.back_assignment.insert(k.into(), fx("0.1"));
        }
        for k in ["c", "x", "m"] {
            b.interest.back_assignment.insert(k.into(), fx("0.1"));
        }
        assert_eq!(transaction_hash(&a).unwrap(), transaction_hash(&b).unwrap());
    }

    #[test]
    fn output_hash_is_plain_encoding_hash() {
        let out = Output::payment("b", fx("10"), AssetClass::Primary, key());
        assert_eq!(
            output_hash(&out).unwrap(),
            sha256(&canonical::encode(&out).unwrap())
        );
    }

    #[test]
    fn credential_hash_ignores_signatures() {
        let mut cred = Credential {
            id: "c1".into(),
            issuer: "guarantor".into(),
            recipient: "a".into(),
            value: fx("4"),
            issue_height: 12,
            issuer_signature: None,
            recipient_signature: None,
        };
        let unsigned = credential_hash(&cred).unwrap();
        cred.issuer_signature = Some(sig());
        cred.recipient_signature = Some(sig());
        assert_eq!(credential_hash(&cred).unwrap(), unsigned);
        cred.value = fx("5");
        assert_ne!(credential_hash(&cred).unwrap(), unsigned);
    }
}

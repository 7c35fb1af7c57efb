//! Shared wallet fixtures for the end-to-end tests.

use tally_core::amount::Fixed;
use tally_core::crypto::KeyPair;
use tally_core::types::{
    AssetClass, BlockPosition, Credential, Output, PublicKeyCoords, SpendableUnit, UnitRef,
};
use tally_wallet::{
    AddressRecord, KeyRing, Membership, MemoryWallet, Recipient, TransactionBuilder, WalletState,
};

use crate::verifier::MockVerifier;

/// Parse a decimal amount.
pub fn fx(text: &str) -> Fixed {
    text.parse().expect("valid amount")
}

/// A public key nobody in the test holds.
pub fn foreign_key() -> PublicKeyCoords {
    KeyPair::generate()
        .public_key()
        .expect("generated key has coordinates")
}

/// A wallet snapshot together with the keys for its addresses.
#[derive(Debug, Default)]
pub struct TestWallet {
    pub wallet: MemoryWallet,
    pub keys: KeyRing,
    next_tx: u32,
}

impl TestWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address with a fresh key.
    pub fn address(&mut self, address: &str, class: AssetClass) -> PublicKeyCoords {
        let pk = self.keys.generate_address(address).expect("key generation");
        self.wallet
            .add_address(AddressRecord::new(address, class, Some(pk.clone())));
        pk
    }

    /// Add a unit of `value` to an existing address.
    pub fn unit(&mut self, owner: &str, value: &str) -> UnitRef {
        let info = self.wallet.address_info(owner).expect("known owner");
        let pk = info.public_key.expect("owner has a key");
        self.next_tx += 1;
        let unit = SpendableUnit {
            unit_ref: UnitRef {
                origin_tx_id: format!("{:016x}", 0xe2e0_0000 + self.next_tx),
                position: BlockPosition {
                    block: 4,
                    major_index: 1,
                    minor_index: 0,
                    output_index: 0,
                },
            },
            owner: owner.into(),
            value: fx(value),
            asset_class: info.asset_class,
            credential_derived: false,
            prior_outputs: vec![Output::payment(owner, fx(value), info.asset_class, pk)],
        };
        let unit_ref = unit.unit_ref.clone();
        self.wallet.add_unit(unit).expect("owner exists");
        unit_ref
    }

    pub fn credential(&mut self, id: &str, recipient: &str, value: &str) {
        self.wallet
            .add_credential(Credential {
                id: id.into(),
                issuer: "guarantor".into(),
                recipient: recipient.into(),
                value: fx(value),
                issue_height: 2,
                issuer_signature: None,
                recipient_signature: None,
            })
            .expect("recipient exists");
    }

    /// Join a guarantor group with a fresh account key.
    pub fn join(&mut self, account: &str, group: &str) -> PublicKeyCoords {
        let pk = self.keys.generate_account(account).expect("key generation");
        self.wallet.set_membership(Some(Membership {
            account: account.into(),
            group_id: group.into(),
        }));
        pk
    }

    /// Make every address key known to a verifier.
    pub fn register_with(&self, verifier: &MockVerifier) {
        for record in &self.wallet.addresses {
            if let Some(pk) = &record.public_key {
                verifier.register_address(&record.address, pk.clone());
            }
        }
    }
}

/// A primary-class payment to a foreign address with change back to `change`.
pub fn pay(to: &str, amount: &str, change: &str) -> TransactionBuilder {
    let mut builder = TransactionBuilder::new();
    builder
        .add_recipient(Recipient::new(to, fx(amount), AssetClass::Primary, foreign_key()))
        .add_change_address(change);
    builder
}

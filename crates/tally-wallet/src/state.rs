//! Wallet state and unit-lock providers.
//!
//! The assembler only reads wallet state. Which units are spent is the
//! caller's business: after a successful submission the caller locks the
//! consumed units (see [`InFlightLocks::lock_consumed`]) until the next
//! balance sync drops them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use tally_core::canonical;
use tally_core::types::{AssetClass, Credential, PublicKeyCoords, SpendableUnit, UnitRef};

use crate::error::WalletError;

/// Class and public key of one wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub asset_class: AssetClass,
    pub public_key: Option<PublicKeyCoords>,
}

/// Guarantor-group membership of the submitting account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Account whose key signs individual envelopes.
    pub account: String,
    pub group_id: String,
}

/// Read-only view of the wallet.
pub trait WalletState: Send + Sync {
    /// Wallet addresses in preference order.
    fn addresses(&self) -> Vec<String>;

    /// Class and public key of an address, `None` if unknown.
    fn address_info(&self, address: &str) -> Option<AddressInfo>;

    /// Unspent units owned by an address, in preference order.
    fn spendable_units(&self, address: &str) -> Vec<SpendableUnit>;

    /// Credentials addressed to an address.
    fn credentials(&self, address: &str) -> Vec<Credential>;

    /// Group membership of the submitter; `None` means retail.
    fn membership(&self) -> Option<Membership> {
        None
    }
}

/// Reservations held by in-flight builds and submissions.
pub trait UnitLocks: Send + Sync {
    fn is_locked(&self, unit: &UnitRef) -> bool;

    fn is_credential_locked(&self, _credential_id: &str) -> bool {
        false
    }
}

/// A lock provider that never reports anything locked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocks;

impl UnitLocks for NoLocks {
    fn is_locked(&self, _unit: &UnitRef) -> bool {
        false
    }
}

/// One address in a [`MemoryWallet`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub address: String,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub public_key: Option<PublicKeyCoords>,
    #[serde(default)]
    pub units: Vec<SpendableUnit>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl AddressRecord {
    pub fn new(
        address: impl Into<String>,
        asset_class: AssetClass,
        public_key: Option<PublicKeyCoords>,
    ) -> Self {
        Self {
            address: address.into(),
            asset_class,
            public_key,
            units: Vec::new(),
            credentials: Vec::new(),
        }
    }
}

/// Wallet state held in memory, loadable from a JSON snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWallet {
    #[serde(default)]
    pub membership: Option<Membership>,
    #[serde(default)]
    pub addresses: Vec<AddressRecord>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot. Amounts and key coordinates must be bare literals.
    pub fn from_json(bytes: &[u8]) -> Result<Self, WalletError> {
        Ok(canonical::decode(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, WalletError> {
        Ok(canonical::encode(self)?)
    }

    /// Add an address, replacing any record with the same name.
    pub fn add_address(&mut self, record: AddressRecord) -> &mut Self {
        self.addresses.retain(|r| r.address != record.address);
        self.addresses.push(record);
        self
    }

    /// Add a unit to the record of its owner.
    pub fn add_unit(&mut self, unit: SpendableUnit) -> Result<&mut Self, WalletError> {
        let record = self.record_mut(&unit.owner)?;
        record.units.push(unit);
        Ok(self)
    }

    /// Add a credential to the record of its recipient.
    pub fn add_credential(&mut self, credential: Credential) -> Result<&mut Self, WalletError> {
        let record = self.record_mut(&credential.recipient)?;
        record.credentials.push(credential);
        Ok(self)
    }

    pub fn set_membership(&mut self, membership: Option<Membership>) -> &mut Self {
        self.membership = membership;
        self
    }

    fn record(&self, address: &str) -> Option<&AddressRecord> {
        self.addresses.iter().find(|r| r.address == address)
    }

    fn record_mut(&mut self, address: &str) -> Result<&mut AddressRecord, WalletError> {
        self.addresses
            .iter_mut()
            .find(|r| r.address == address)
            .ok_or_else(|| WalletError::InvalidInput(format!("unknown address {address}")))
    }
}

impl WalletState for MemoryWallet {
    fn addresses(&self) -> Vec<String> {
        self.addresses.iter().map(|r| r.address.clone()).collect()
    }

    fn address_info(&self, address: &str) -> Option<AddressInfo> {
        self.record(address).map(|r| AddressInfo {
            asset_class: r.asset_class,
            public_key: r.public_key.clone(),
        })
    }

    fn spendable_units(&self, address: &str) -> Vec<SpendableUnit> {
        self.record(address)
            .map(|r| r.units.clone())
            .unwrap_or_default()
    }

    fn credentials(&self, address: &str) -> Vec<Credential> {
        self.record(address)
            .map(|r| r.credentials.clone())
            .unwrap_or_default()
    }

    fn membership(&self) -> Option<Membership> {
        self.membership.clone()
    }
}

#[derive(Debug, Default)]
struct LockSet {
    units: HashSet<UnitRef>,
    credentials: HashSet<String>,
}

/// Thread-safe registry of units and credentials reserved by submissions
/// that have not yet been reflected in wallet state.
#[derive(Debug, Default)]
pub struct InFlightLocks {
    inner: Mutex<LockSet>,
}

impl InFlightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve everything a submitted build consumed.
    pub fn lock_consumed<'a>(
        &self,
        units: impl IntoIterator<Item = &'a UnitRef>,
        credentials: impl IntoIterator<Item = &'a String>,
    ) {
        let mut set = self.inner.lock();
        set.units.extend(units.into_iter().cloned());
        set.credentials.extend(credentials.into_iter().cloned());
    }

    /// Drop reservations, e.g. after a rejected submission or a sync.
    pub fn release<'a>(
        &self,
        units: impl IntoIterator<Item = &'a UnitRef>,
        credentials: impl IntoIterator<Item = &'a String>,
    ) {
        let mut set = self.inner.lock();
        for unit in units {
            set.units.remove(unit);
        }
        for id in credentials {
            set.credentials.remove(id);
        }
    }

    pub fn clear(&self) {
        let mut set = self.inner.lock();
        set.units.clear();
        set.credentials.clear();
    }

    /// Number of locked units and credentials.
    pub fn len(&self) -> usize {
        let set = self.inner.lock();
        set.units.len() + set.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UnitLocks for InFlightLocks {
    fn is_locked(&self, unit: &UnitRef) -> bool {
        self.inner.lock().units.contains(unit)
    }

    fn is_credential_locked(&self, credential_id: &str) -> bool {
        self.inner.lock().credentials.contains(credential_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_core::crypto::KeyPair;
    use tally_core::types::{BlockPosition, Output};

    fn coords() -> PublicKeyCoords {
        KeyPair::generate().public_key().unwrap()
    }

    fn unit(owner: &str, tx: &str, value: &str) -> SpendableUnit {
        let value = value.parse().unwrap();
        SpendableUnit {
            unit_ref: UnitRef {
                origin_tx_id: tx.into(),
                position: BlockPosition::default(),
            },
            owner: owner.into(),
            value,
            asset_class: AssetClass::Primary,
            credential_derived: false,
            prior_outputs: vec![Output::payment(owner, value, AssetClass::Primary, coords())],
        }
    }

    fn wallet() -> MemoryWallet {
        let mut w = MemoryWallet::new();
        w.add_address(AddressRecord::new("a1", AssetClass::Primary, Some(coords())))
            .add_address(AddressRecord::new("a2", AssetClass::Secondary, None));
        w.add_unit(unit("a1", "t1", "5")).unwrap();
        w
    }

    #[test]
    fn addresses_keep_insertion_order() {
        assert_eq!(wallet().addresses(), vec!["a1", "a2"]);
    }

    #[test]
    fn unknown_address_has_nothing() {
        let w = wallet();
        assert!(w.address_info("zz").is_none());
        assert!(w.spendable_units("zz").is_empty());
        assert!(w.credentials("zz").is_empty());
    }

    #[test]
    fn add_unit_requires_known_owner() {
        let mut w = wallet();
        assert!(matches!(
            w.add_unit(unit("zz", "t2", "1")),
            Err(WalletError::InvalidInput(_))
        ));
    }

    #[test]
    fn snapshot_round_trips() {
        let mut w = wallet();
        w.set_membership(Some(Membership {
            account: "alice".into(),
            group_id: "g1".into(),
        }));
        let bytes = w.to_json().unwrap();
        let back = MemoryWallet::from_json(&bytes).unwrap();
        assert_eq!(back, w);
        assert_eq!(back.membership().unwrap().group_id, "g1");
    }

    #[test]
    fn snapshot_defaults_missing_sections() {
        let w = MemoryWallet::from_json(br#"{"addresses":[{"address":"x","assetClass":2}]}"#)
            .unwrap();
        assert!(w.membership().is_none());
        let info = w.address_info("x").unwrap();
        assert_eq!(info.asset_class, AssetClass::Tertiary);
        assert!(info.public_key.is_none());
    }

    #[test]
    fn locks_reserve_and_release() {
        let locks = InFlightLocks::new();
        let u = unit("a1", "t1", "5").unit_ref;
        let cred = "c1".to_string();
        locks.lock_consumed([&u], [&cred]);
        assert!(locks.is_locked(&u));
        assert!(locks.is_credential_locked("c1"));
        assert_eq!(locks.len(), 2);
        locks.release([&u], []);
        assert!(!locks.is_locked(&u));
        locks.clear();
        assert!(locks.is_empty());
    }

    #[test]
    fn locks_are_shared_across_threads() {
        let locks = Arc::new(InFlightLocks::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let locks = Arc::clone(&locks);
                std::thread::spawn(move || {
                    let u = unit("a1", &format!("t{i}"), "1").unit_ref;
                    locks.lock_consumed([&u], []);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(locks.len(), 4);
    }
}

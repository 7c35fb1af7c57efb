//! Greedy per-class unit selection with credential supplementation.
//!
//! Selection walks candidate addresses in caller order and each address's
//! units in provider order, so identical inputs always select identical
//! units. Credentials only ever top up the primary class.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use tally_core::amount::{Amount, Fixed};
use tally_core::types::{AssetClass, Credential, SpendableUnit};

use crate::error::WalletError;
use crate::state::{UnitLocks, WalletState};

/// How a unit pass treats a shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Fail with [`WalletError::InsufficientBalance`] on any shortfall.
    Strict,
    /// Return whatever was collected.
    BestEffort,
}

/// Whether and which credentials may supplement units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Never use credentials.
    Disabled,
    /// Use any unlocked credential of a candidate address.
    #[default]
    Any,
    /// Use only the listed credentials.
    Only(Vec<String>),
}

impl CredentialPolicy {
    fn allows(&self, credential_id: &str) -> bool {
        match self {
            Self::Disabled => false,
            Self::Any => true,
            Self::Only(ids) => ids.iter().any(|id| id == credential_id),
        }
    }
}

/// Result of coin selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected units in selection order.
    pub units: Vec<SpendableUnit>,
    /// Selected credentials in selection order.
    pub credentials: Vec<Credential>,
}

impl Selection {
    /// Value of selected units in a class.
    pub fn unit_total(&self, class: AssetClass) -> Amount {
        self.units
            .iter()
            .filter(|u| u.asset_class == class)
            .fold(Fixed::ZERO, |acc, u| acc.checked_add(u.value).unwrap_or(Fixed::MAX))
    }

    /// Value of selected credentials. Always primary class.
    pub fn credential_total(&self) -> Amount {
        self.credentials
            .iter()
            .fold(Fixed::ZERO, |acc, c| acc.checked_add(c.value).unwrap_or(Fixed::MAX))
    }

    /// Value available in a class from units and credentials together.
    pub fn total(&self, class: AssetClass) -> Amount {
        let units = self.unit_total(class);
        if class == AssetClass::Primary {
            units
                .checked_add(self.credential_total())
                .unwrap_or(Fixed::MAX)
        } else {
            units
        }
    }

    /// First class, in class order, whose requirement is not covered.
    pub fn check_covers(&self, required: &BTreeMap<AssetClass, Amount>) -> Result<(), WalletError> {
        for (&class, &need) in required {
            let available = self.total(class);
            if available < need {
                return Err(WalletError::InsufficientBalance {
                    class,
                    required: need,
                    available,
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.credentials.is_empty()
    }
}

/// Selects units and credentials from wallet state.
pub struct CoinSelector<'a> {
    state: &'a dyn WalletState,
    locks: &'a dyn UnitLocks,
}

impl<'a> CoinSelector<'a> {
    pub fn new(state: &'a dyn WalletState, locks: &'a dyn UnitLocks) -> Self {
        Self { state, locks }
    }

    /// Greedy unit pass over the candidate addresses.
    ///
    /// Units of classes not in `required`, or whose class is already
    /// covered, are skipped, as are locked units.
    pub fn select_units(
        &self,
        candidates: &[String],
        required: &BTreeMap<AssetClass, Amount>,
        mode: SelectionMode,
    ) -> Result<Selection, WalletError> {
        let mut selection = Selection::default();
        let mut collected: BTreeMap<AssetClass, Amount> = BTreeMap::new();
        let mut seen = HashSet::new();

        'addresses: for address in candidates {
            for unit in self.state.spendable_units(address) {
                if covers(&collected, required) {
                    break 'addresses;
                }
                let Some(&need) = required.get(&unit.asset_class) else {
                    continue;
                };
                let have = collected.entry(unit.asset_class).or_insert(Fixed::ZERO);
                if *have >= need {
                    continue;
                }
                if self.locks.is_locked(&unit.unit_ref) {
                    debug!(unit = %unit.unit_ref, "skipping locked unit");
                    continue;
                }
                if !seen.insert(unit.unit_ref.clone()) {
                    continue;
                }
                *have = have
                    .checked_add(unit.value)
                    .ok_or_else(|| WalletError::InvalidAmount("selected value overflow".into()))?;
                selection.units.push(unit);
            }
        }

        if mode == SelectionMode::Strict {
            selection.check_covers(required)?;
        }
        debug!(
            units = selection.units.len(),
            strict = mode == SelectionMode::Strict,
            "unit selection finished"
        );
        Ok(selection)
    }

    /// Add credentials until the primary class reaches `required_primary`
    /// or the candidates run out.
    pub fn supplement_credentials(
        &self,
        selection: &mut Selection,
        candidates: &[String],
        required_primary: Amount,
        policy: &CredentialPolicy,
    ) {
        for address in candidates {
            for credential in self.state.credentials(address) {
                if selection.total(AssetClass::Primary) >= required_primary {
                    return;
                }
                if credential.recipient != *address || !policy.allows(&credential.id) {
                    continue;
                }
                if self.locks.is_credential_locked(&credential.id) {
                    debug!(credential = %credential.id, "skipping locked credential");
                    continue;
                }
                if selection.credentials.iter().any(|c| c.id == credential.id) {
                    continue;
                }
                debug!(credential = %credential.id, value = %credential.value, "supplementing with credential");
                selection.credentials.push(credential);
            }
        }
    }

    /// Full selection: units, then credentials for a primary-class
    /// shortfall when the policy allows them, then a strict check over
    /// both together.
    pub fn select(
        &self,
        candidates: &[String],
        required: &BTreeMap<AssetClass, Amount>,
        policy: &CredentialPolicy,
    ) -> Result<Selection, WalletError> {
        if *policy == CredentialPolicy::Disabled {
            return self.select_units(candidates, required, SelectionMode::Strict);
        }

        let mut selection = self.select_units(candidates, required, SelectionMode::BestEffort)?;
        let need = required
            .get(&AssetClass::Primary)
            .copied()
            .unwrap_or(Fixed::ZERO);
        if selection.total(AssetClass::Primary) < need {
            self.supplement_credentials(&mut selection, candidates, need, policy);
        }
        selection.check_covers(required)?;
        Ok(selection)
    }
}

fn covers(collected: &BTreeMap<AssetClass, Amount>, required: &BTreeMap<AssetClass, Amount>) -> bool {
    required
        .iter()
        .all(|(class, need)| collected.get(class).copied().unwrap_or(Fixed::ZERO) >= *need)
}

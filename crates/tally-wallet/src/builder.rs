//! Transaction assembly and signing.
//!
//! A build runs in one pass:
//! 1. Validate the request (cross-domain rules before anything else)
//! 2. Select units, supplementing with credentials when allowed
//! 3. Lay out outputs: recipients, change per class, fee conversion
//! 4. Sign inputs over their prior outputs and credentials over their hash
//! 5. Assign interest, derive the id, sign the whole transaction
//! 6. Wrap in an individual or aggregate envelope
//!
//! Keys are fetched from the [`KeyProvider`] only after every prior output
//! has been resolved, so bad wallet data never triggers a prompt.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use tally_core::amount::{Amount, Fixed};
use tally_core::canonical;
use tally_core::constants::{CHANGE_EPSILON, TX_VERSION};
use tally_core::crypto::KeyPair;
use tally_core::hash::{Hash256, credential_hash, derive_tx_id, output_hash, transaction_hash};
use tally_core::types::{
    AssetClass, Credential, Input, InterestAssignment, Output, PublicKeyCoords, Transaction,
    TxType, UnitRef,
};

use crate::coin_selection::{CoinSelector, CredentialPolicy, Selection};
use crate::envelope::{AggregateEnvelope, Envelope, IndividualEnvelope};
use crate::error::{CrossDomainViolation, KeyRole, WalletError};
use crate::keys::KeyProvider;
use crate::params::{Recipient, TransferKind, TransferRequest};
use crate::state::{UnitLocks, WalletState};

/// A signed envelope plus what it consumed.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    envelope: Envelope,
    pub tx_id: String,
    /// Hash the id was derived from and the whole-transaction signature covers.
    pub tx_hash: Hash256,
    /// Units spent; lock these once the submission is accepted.
    pub consumed_units: Vec<UnitRef>,
    /// Credentials spent.
    pub consumed_credentials: Vec<String>,
}

impl BuildOutcome {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// The built transaction.
    pub fn transaction(&self) -> &Transaction {
        match &self.envelope {
            Envelope::Individual(e) => &e.transaction,
            // Built aggregate envelopes always hold exactly one transaction.
            Envelope::Aggregate(e) => &e.transactions[0],
        }
    }
}

/// Key pairs fetched during one build, so each owner is asked once.
struct Signers<'k> {
    keys: &'k dyn KeyProvider,
    cache: HashMap<String, KeyPair>,
}

impl<'k> Signers<'k> {
    fn new(keys: &'k dyn KeyProvider) -> Self {
        Self {
            keys,
            cache: HashMap::new(),
        }
    }

    async fn address(
        &mut self,
        address: &str,
        role: KeyRole,
        expected: Option<&PublicKeyCoords>,
    ) -> Result<&KeyPair, WalletError> {
        if !self.cache.contains_key(address) {
            let secret = self
                .keys
                .address_key(address)
                .await
                .map_err(|e| e.into_wallet_error(role, address))?;
            let pair = KeyPair::from_secret(&secret).map_err(|_| WalletError::KeyUnavailable {
                role,
                id: address.to_string(),
            })?;
            if let Some(expected) = expected {
                if pair.public_key()? != *expected {
                    return Err(WalletError::KeyMismatch(address.to_string()));
                }
            }
            self.cache.insert(address.to_string(), pair);
        }
        self.cache
            .get(address)
            .ok_or_else(|| WalletError::KeyUnavailable {
                role,
                id: address.to_string(),
            })
    }

    async fn account(&self, account: &str) -> Result<KeyPair, WalletError> {
        let secret = self
            .keys
            .account_key(account)
            .await
            .map_err(|e| e.into_wallet_error(KeyRole::Submitter, account))?;
        KeyPair::from_secret(&secret).map_err(|_| WalletError::KeyUnavailable {
            role: KeyRole::Submitter,
            id: account.to_string(),
        })
    }
}

/// Builder for constructing and signing transactions.
///
/// # Example
/// ```ignore
/// let outcome = TransactionBuilder::new()
///     .add_recipient(Recipient::new(addr, amount, AssetClass::Primary, key))
///     .add_change_address(change)
///     .build(&wallet, &locks, &keys)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    request: TransferRequest,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete request, e.g. one produced by a legacy adapter.
    pub fn from_request(request: TransferRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    pub fn add_recipient(&mut self, recipient: Recipient) -> &mut Self {
        self.request.recipients.push(recipient);
        self
    }

    /// Restrict spending to these addresses, in this order.
    pub fn add_source(&mut self, address: impl Into<String>) -> &mut Self {
        self.request.from_addresses.push(address.into());
        self
    }

    pub fn add_change_address(&mut self, address: impl Into<String>) -> &mut Self {
        self.request.change_addresses.push(address.into());
        self
    }

    pub fn set_kind(&mut self, kind: TransferKind) -> &mut Self {
        self.request.kind = kind;
        self
    }

    pub fn set_fee_conversion(&mut self, amount: Amount) -> &mut Self {
        self.request.fee_conversion = Some(amount);
        self
    }

    /// Interest amount and the share of it allocated to recipient outputs.
    pub fn set_interest(&mut self, amount: Amount, output_share: Fixed) -> &mut Self {
        self.request.interest = amount;
        self.request.interest_output_share = output_share;
        self
    }

    pub fn set_height(&mut self, height: u64) -> &mut Self {
        self.request.height = height;
        self
    }

    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.request.data = data;
        self
    }

    pub fn disable_credentials(&mut self) -> &mut Self {
        self.request.no_credentials = true;
        self
    }

    /// Check the request without touching wallet state.
    pub fn validate(&self) -> Result<(), WalletError> {
        let req = &self.request;
        if req.recipients.is_empty() {
            return Err(WalletError::InvalidInput("no recipients".into()));
        }

        match req.kind {
            TransferKind::CrossDomain => {
                if req.recipients.len() != 1 {
                    return Err(WalletError::CrossDomain(CrossDomainViolation::RecipientCount(
                        req.recipients.len(),
                    )));
                }
                let class = req.recipients[0].asset_class;
                if class != AssetClass::Primary {
                    return Err(WalletError::CrossDomain(CrossDomainViolation::NonPrimaryClass(class)));
                }
                if req.change_addresses.len() > 1 {
                    return Err(WalletError::CrossDomain(
                        CrossDomainViolation::ChangeAddressCount(req.change_addresses.len()),
                    ));
                }
                if !req.credential_ids.is_empty() {
                    return Err(WalletError::CrossDomain(CrossDomainViolation::CredentialsRequested));
                }
            }
            TransferKind::Pledge if !req.credential_ids.is_empty() => {
                return Err(WalletError::InvalidInput(
                    "pledge transfers cannot use credentials".into(),
                ));
            }
            _ => {}
        }

        for r in &req.recipients {
            if r.address.is_empty() {
                return Err(WalletError::InvalidInput("empty recipient address".into()));
            }
            if r.amount.is_zero() {
                return Err(WalletError::InvalidAmount(format!(
                    "zero amount for recipient {}",
                    r.address
                )));
            }
            if r.public_key.is_none() {
                return Err(WalletError::MissingPublicKey(r.address.clone()));
            }
        }
        if req.fee_conversion.is_some_and(Fixed::is_zero) {
            return Err(WalletError::InvalidAmount("zero fee conversion".into()));
        }
        if req.interest_output_share > Fixed::ONE {
            return Err(WalletError::InvalidInput(format!(
                "interest output share {} exceeds 1",
                req.interest_output_share
            )));
        }
        Ok(())
    }

    fn credential_policy(&self) -> CredentialPolicy {
        let req = &self.request;
        if req.kind != TransferKind::Standard || req.no_credentials {
            CredentialPolicy::Disabled
        } else if req.credential_ids.is_empty() {
            CredentialPolicy::Any
        } else {
            CredentialPolicy::Only(req.credential_ids.clone())
        }
    }

    /// Select, assemble, sign and wrap a transaction.
    ///
    /// Wallet state is only read; the caller locks
    /// [`BuildOutcome::consumed_units`] after a successful submission.
    pub async fn build(
        &self,
        state: &dyn WalletState,
        locks: &dyn UnitLocks,
        keys: &dyn KeyProvider,
    ) -> Result<BuildOutcome, WalletError> {
        self.validate()?;
        let req = &self.request;
        let required = req.required_by_class()?;

        let candidates = if req.from_addresses.is_empty() {
            state.addresses()
        } else {
            req.from_addresses.clone()
        };
        let selection = CoinSelector::new(state, locks).select(
            &candidates,
            &required,
            &self.credential_policy(),
        )?;
        debug!(
            units = selection.units.len(),
            credentials = selection.credentials.len(),
            "selection complete"
        );

        let mut outputs = self.recipient_outputs();
        let recipient_count = outputs.len();
        outputs.extend(self.change_outputs(state, &selection, &required)?);
        if let Some(fee) = req.fee_conversion {
            outputs.push(Output::fee_conversion(fee));
        }

        let prior_hashes = resolve_prior_outputs(&selection)?;
        let mut signers = Signers::new(keys);
        let inputs = sign_inputs(&selection, &prior_hashes, state, &mut signers).await?;
        let credential_inputs = sign_credentials(&selection.credentials, state, &mut signers).await?;

        let interest = self.assign_interest(&mut outputs[..recipient_count], &selection)?;

        let membership = state.membership();
        let tx_type = match req.kind {
            TransferKind::CrossDomain => TxType::CrossDomain,
            _ if !credential_inputs.is_empty() => TxType::CredentialAssisted,
            _ if membership.is_none() => TxType::Retail,
            _ => TxType::Plain,
        };

        let mut value_by_class = BTreeMap::new();
        for class in AssetClass::ALL {
            let moved = required.get(&class).copied().unwrap_or(Fixed::ZERO);
            value_by_class.insert(class.map_key(), moved);
        }
        let value = Fixed::checked_sum(value_by_class.values().copied())
            .ok_or_else(|| WalletError::InvalidAmount("transaction value overflows".into()))?;

        let mut tx = Transaction {
            tx_id: String::new(),
            size: 0,
            version: TX_VERSION,
            group_id: membership
                .as_ref()
                .map(|m| m.group_id.clone())
                .unwrap_or_default(),
            tx_type,
            value,
            value_by_class,
            interest,
            inputs,
            credential_inputs,
            outputs,
            signature: None,
            data: req.data.clone(),
        };

        let tx_hash = transaction_hash(&tx)?;
        tx.tx_id = derive_tx_id(&tx_hash);
        let signer = tx
            .inputs
            .first()
            .map(|i| i.from_address.clone())
            .or_else(|| tx.credential_inputs.first().map(|c| c.recipient.clone()))
            .ok_or_else(|| WalletError::InvalidInput("nothing selected to sign with".into()))?;
        let pair = signers.address(&signer, KeyRole::Transaction, None).await?;
        tx.signature = Some(pair.sign_hash(&tx_hash)?);
        tx.size = canonical::encode(&tx)?.len() as u64;

        let tx_id = tx.tx_id.clone();
        let envelope = match membership {
            Some(m) => {
                let mut env = IndividualEnvelope::new(tx, m.account.clone(), m.group_id, req.height);
                let account = signers.account(&m.account).await?;
                env.signature = Some(account.sign_hash(&env.signing_hash()?)?);
                Envelope::Individual(env)
            }
            None => Envelope::Aggregate(AggregateEnvelope::new(vec![tx])?),
        };

        let outcome = BuildOutcome {
            tx_id,
            tx_hash,
            consumed_units: selection.units.iter().map(|u| u.unit_ref.clone()).collect(),
            consumed_credentials: selection.credentials.iter().map(|c| c.id.clone()).collect(),
            envelope,
        };
        let tx = outcome.transaction();
        info!(
            tx_id = %outcome.tx_id,
            tx_type = tx.tx_type.code(),
            inputs = tx.inputs.len(),
            credentials = tx.credential_inputs.len(),
            outputs = tx.outputs.len(),
            size = tx.size,
            aggregate = outcome.envelope.is_aggregate(),
            "transaction built"
        );
        Ok(outcome)
    }

    fn recipient_outputs(&self) -> Vec<Output> {
        let cross_domain = self.request.kind == TransferKind::CrossDomain;
        self.request
            .recipients
            .iter()
            .filter_map(|r| {
                let key = r.public_key.clone()?;
                let mut out = Output::payment(r.address.clone(), r.amount, r.asset_class, key);
                out.is_cross_domain = cross_domain;
                Some(out)
            })
            .collect()
    }

    fn change_outputs(
        &self,
        state: &dyn WalletState,
        selection: &Selection,
        required: &BTreeMap<AssetClass, Amount>,
    ) -> Result<Vec<Output>, WalletError> {
        let mut change = Vec::new();
        for class in AssetClass::ALL {
            let need = required.get(&class).copied().unwrap_or(Fixed::ZERO);
            let remainder = selection.total(class).saturating_sub(need);
            if remainder <= CHANGE_EPSILON {
                continue;
            }
            let (address, info) = self
                .request
                .change_addresses
                .iter()
                .find_map(|a| {
                    state
                        .address_info(a)
                        .filter(|info| info.asset_class == class)
                        .map(|info| (a, info))
                })
                .ok_or(WalletError::UnmatchedChangeClass(class))?;
            let key = info
                .public_key
                .ok_or_else(|| WalletError::MissingPublicKey(address.clone()))?;
            debug!(%address, %class, change = %remainder, "change output");
            change.push(Output::payment(address.clone(), remainder, class, key));
        }
        Ok(change)
    }

    /// Split the output share across recipients by value and back-assign
    /// the interest to contributing addresses by contributed value.
    fn assign_interest(
        &self,
        recipients: &mut [Output],
        selection: &Selection,
    ) -> Result<InterestAssignment, WalletError> {
        let overflow = || WalletError::InvalidAmount("interest allocation overflows".into());
        let req = &self.request;

        let pool = req.interest.mul_ratio(req.interest_output_share);
        let total = Fixed::checked_sum(recipients.iter().map(|o| o.value)).ok_or_else(overflow)?;
        let last = recipients.len().saturating_sub(1);
        let mut allocated = Fixed::ZERO;
        for (i, out) in recipients.iter_mut().enumerate() {
            let share = if i == last {
                pool.saturating_sub(allocated)
            } else {
                pool.mul_div(out.value, total).ok_or_else(overflow)?
            };
            out.interest = share;
            allocated = allocated.checked_add(share).ok_or_else(overflow)?;
        }

        let mut contributions: BTreeMap<&str, Amount> = BTreeMap::new();
        let contributed = selection
            .units
            .iter()
            .map(|u| (u.owner.as_str(), u.value))
            .chain(selection.credentials.iter().map(|c| (c.recipient.as_str(), c.value)));
        for (address, value) in contributed {
            let slot = contributions.entry(address).or_insert(Fixed::ZERO);
            *slot = slot.checked_add(value).ok_or_else(overflow)?;
        }
        let contributed_total =
            Fixed::checked_sum(contributions.values().copied()).ok_or_else(overflow)?;

        let mut back_assignment = BTreeMap::new();
        let last = contributions.len().saturating_sub(1);
        let mut assigned = Fixed::ZERO;
        for (i, (address, value)) in contributions.into_iter().enumerate() {
            let ratio = if i == last {
                Fixed::ONE.saturating_sub(assigned)
            } else {
                Fixed::ONE.mul_div(value, contributed_total).ok_or_else(overflow)?
            };
            assigned = assigned.checked_add(ratio).ok_or_else(overflow)?;
            back_assignment.insert(address.to_string(), ratio);
        }

        Ok(InterestAssignment {
            amount: req.interest,
            output_share: req.interest_output_share,
            back_assignment,
        })
    }
}

/// Hash the prior output behind every selected unit.
fn resolve_prior_outputs(selection: &Selection) -> Result<Vec<Hash256>, WalletError> {
    selection
        .units
        .iter()
        .map(|unit| {
            let incomplete = |detail: String| WalletError::IncompleteWalletData {
                unit: unit.unit_ref.to_string(),
                detail,
            };
            let index = unit.unit_ref.position.output_index;
            let prior = unit.referenced_output().ok_or_else(|| {
                incomplete(format!(
                    "output index {index} out of range for {} prior outputs",
                    unit.prior_outputs.len()
                ))
            })?;
            if prior.value != unit.value || prior.asset_class != unit.asset_class {
                return Err(incomplete(format!(
                    "prior output {index} holds {} of class {}, unit claims {} of class {}",
                    prior.value, prior.asset_class, unit.value, unit.asset_class
                )));
            }
            Ok(output_hash(prior)?)
        })
        .collect()
}

async fn sign_inputs(
    selection: &Selection,
    prior_hashes: &[Hash256],
    state: &dyn WalletState,
    signers: &mut Signers<'_>,
) -> Result<Vec<Input>, WalletError> {
    let mut inputs = Vec::with_capacity(selection.units.len());
    for (unit, hash) in selection.units.iter().zip(prior_hashes) {
        let expected = state.address_info(&unit.owner).and_then(|i| i.public_key);
        let pair = signers
            .address(&unit.owner, KeyRole::Input, expected.as_ref())
            .await?;
        inputs.push(Input {
            from_tx_id: unit.unit_ref.origin_tx_id.clone(),
            from_position: unit.unit_ref.position,
            from_address: unit.owner.clone(),
            is_credential_derived: unit.credential_derived,
            is_issuer_made: false,
            output_hash: hash.to_vec(),
            signature: Some(pair.sign_hash(hash)?),
        });
    }
    Ok(inputs)
}

async fn sign_credentials(
    credentials: &[Credential],
    state: &dyn WalletState,
    signers: &mut Signers<'_>,
) -> Result<Vec<Credential>, WalletError> {
    let mut signed = Vec::with_capacity(credentials.len());
    for credential in credentials {
        let hash = credential_hash(credential)?;
        let expected = state
            .address_info(&credential.recipient)
            .and_then(|i| i.public_key);
        let pair = signers
            .address(&credential.recipient, KeyRole::Credential, expected.as_ref())
            .await?;
        let mut credential = credential.clone();
        credential.recipient_signature = Some(pair.sign_hash(&hash)?);
        signed.push(credential);
    }
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tally_core::crypto::{SecretScalar, verify_hash};
    use tally_core::types::{BlockPosition, SpendableUnit};

    use crate::keys::{KeyError, KeyRing};
    use crate::state::{AddressRecord, InFlightLocks, MemoryWallet, Membership, NoLocks};

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn foreign_key() -> PublicKeyCoords {
        KeyPair::generate().public_key().unwrap()
    }

    struct Fixture {
        wallet: MemoryWallet,
        keys: KeyRing,
        next_tx: u32,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                wallet: MemoryWallet::new(),
                keys: KeyRing::new(),
                next_tx: 0,
            }
        }

        fn address(&mut self, address: &str, class: AssetClass) -> PublicKeyCoords {
            let pk = self.keys.generate_address(address).unwrap();
            self.wallet
                .add_address(AddressRecord::new(address, class, Some(pk.clone())));
            pk
        }

        fn unit(&mut self, owner: &str, value: &str) -> UnitRef {
            let class = self.wallet.address_info(owner).unwrap().asset_class;
            let pk = self.wallet.address_info(owner).unwrap().public_key.unwrap();
            self.next_tx += 1;
            let unit = SpendableUnit {
                unit_ref: UnitRef {
                    origin_tx_id: format!("{:016x}", self.next_tx),
                    position: BlockPosition {
                        block: 10,
                        major_index: 0,
                        minor_index: 0,
                        output_index: 1,
                    },
                },
                owner: owner.into(),
                value: fx(value),
                asset_class: class,
                credential_derived: false,
                prior_outputs: vec![
                    Output::payment("someone", fx("99"), AssetClass::Primary, foreign_key()),
                    Output::payment(owner, fx(value), class, pk),
                ],
            };
            let unit_ref = unit.unit_ref.clone();
            self.wallet.add_unit(unit).unwrap();
            unit_ref
        }

        fn credential(&mut self, id: &str, recipient: &str, value: &str) {
            self.wallet
                .add_credential(Credential {
                    id: id.into(),
                    issuer: "guarantor".into(),
                    recipient: recipient.into(),
                    value: fx(value),
                    issue_height: 3,
                    issuer_signature: None,
                    recipient_signature: None,
                })
                .unwrap();
        }

        async fn build(&self, builder: &TransactionBuilder) -> Result<BuildOutcome, WalletError> {
            builder.build(&self.wallet, &NoLocks, &self.keys).await
        }
    }

    fn pay(amount: &str) -> TransactionBuilder {
        let mut b = TransactionBuilder::new();
        b.add_recipient(Recipient::new("shop", fx(amount), AssetClass::Primary, foreign_key()))
            .add_change_address("a1");
        b
    }

    struct CancellingKeys;

    #[async_trait]
    impl KeyProvider for CancellingKeys {
        async fn address_key(&self, _address: &str) -> Result<SecretScalar, KeyError> {
            Err(KeyError::Cancelled)
        }

        async fn account_key(&self, _account: &str) -> Result<SecretScalar, KeyError> {
            Err(KeyError::Cancelled)
        }
    }

    #[tokio::test]
    async fn six_and_five_pay_ten_with_change_one() {
        let mut f = Fixture::new();
        let pk = f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.unit("a1", "5");

        let outcome = f.build(&pay("10")).await.unwrap();
        let tx = outcome.transaction();

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].to_address, "shop");
        assert_eq!(tx.outputs[0].value, fx("10"));
        assert_eq!(tx.outputs[1].to_address, "a1");
        assert_eq!(tx.outputs[1].value, fx("1"));

        let hash = transaction_hash(tx).unwrap();
        assert_eq!(hash, outcome.tx_hash);
        assert_eq!(tx.tx_id.len(), 16);
        assert_eq!(tx.tx_id, hex_prefix(&hash));
        verify_hash(&pk, &hash, tx.signature.as_ref().unwrap()).unwrap();
        assert_eq!(outcome.consumed_units.len(), 2);
        assert_eq!(tx.size, canonical::encode(tx).unwrap().len() as u64);
    }

    fn hex_prefix(hash: &Hash256) -> String {
        hash.to_string()[..16].to_string()
    }

    #[tokio::test]
    async fn input_signatures_cover_prior_output_hash() {
        let mut f = Fixture::new();
        let pk = f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let outcome = f.build(&pay("6")).await.unwrap();
        let tx = outcome.transaction();
        let unit = &f.wallet.spendable_units("a1")[0];
        let expected = output_hash(&unit.prior_outputs[1]).unwrap();
        assert_eq!(tx.inputs[0].output_hash, expected.to_vec());
        assert_eq!(tx.inputs[0].from_position.output_index, 1);
        verify_hash(&pk, &expected, tx.inputs[0].signature.as_ref().unwrap()).unwrap();
        // Exact spend, no change.
        assert_eq!(tx.outputs.len(), 1);
    }

    #[tokio::test]
    async fn retail_submitter_gets_aggregate_envelope() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let outcome = f.build(&pay("1")).await.unwrap();
        assert!(outcome.envelope.is_aggregate());
        assert_eq!(outcome.transaction().tx_type, TxType::Retail);
        assert_eq!(outcome.transaction().group_id, "");
        match &outcome.envelope {
            Envelope::Aggregate(e) => assert!(e.hash_matches().unwrap()),
            Envelope::Individual(_) => panic!("expected aggregate envelope"),
        }
    }

    #[tokio::test]
    async fn member_gets_signed_individual_envelope() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let account_pk = f.keys.generate_account("alice").unwrap();
        f.wallet.set_membership(Some(Membership {
            account: "alice".into(),
            group_id: "g7".into(),
        }));
        let mut b = pay("2");
        b.set_height(42);
        let outcome = f.build(&b).await.unwrap();
        let Envelope::Individual(env) = &outcome.envelope else {
            panic!("expected individual envelope");
        };
        assert_eq!(env.group_id, "g7");
        assert_eq!(env.height, 42);
        assert_eq!(env.transaction.tx_type, TxType::Plain);
        assert_eq!(env.transaction.group_id, "g7");
        env.verify(&account_pk).unwrap();
    }

    #[tokio::test]
    async fn missing_account_key_fails_whole_build() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.wallet.set_membership(Some(Membership {
            account: "alice".into(),
            group_id: "g7".into(),
        }));
        let err = f.build(&pay("2")).await.unwrap_err();
        assert_eq!(
            err,
            WalletError::KeyUnavailable {
                role: KeyRole::Submitter,
                id: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn cross_domain_two_recipients_fails_before_selection() {
        // Empty wallet: any selection attempt would report insufficiency.
        let f = Fixture::new();
        let mut b = TransactionBuilder::new();
        b.set_kind(TransferKind::CrossDomain)
            .add_recipient(Recipient::new("x", fx("1"), AssetClass::Primary, foreign_key()))
            .add_recipient(Recipient::new("y", fx("1"), AssetClass::Primary, foreign_key()));
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::CrossDomain(CrossDomainViolation::RecipientCount(2))
        );
    }

    #[tokio::test]
    async fn cross_domain_rules() {
        let f = Fixture::new();
        let mut b = TransactionBuilder::new();
        b.set_kind(TransferKind::CrossDomain)
            .add_recipient(Recipient::new("x", fx("1"), AssetClass::Secondary, foreign_key()));
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::CrossDomain(CrossDomainViolation::NonPrimaryClass(AssetClass::Secondary))
        );

        let mut b = TransactionBuilder::new();
        b.set_kind(TransferKind::CrossDomain)
            .add_recipient(Recipient::new("x", fx("1"), AssetClass::Primary, foreign_key()))
            .add_change_address("c1")
            .add_change_address("c2");
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::CrossDomain(CrossDomainViolation::ChangeAddressCount(2))
        );

        let mut req = TransferRequest::new();
        req.kind = TransferKind::CrossDomain;
        req.recipients
            .push(Recipient::new("x", fx("1"), AssetClass::Primary, foreign_key()));
        req.credential_ids.push("c1".into());
        assert_eq!(
            TransactionBuilder::from_request(req).validate().unwrap_err(),
            WalletError::CrossDomain(CrossDomainViolation::CredentialsRequested)
        );
    }

    #[tokio::test]
    async fn cross_domain_marks_output_and_type() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "5");
        let mut b = pay("5");
        b.set_kind(TransferKind::CrossDomain);
        let outcome = f.build(&b).await.unwrap();
        let tx = outcome.transaction();
        assert_eq!(tx.tx_type, TxType::CrossDomain);
        assert!(tx.outputs[0].is_cross_domain);
    }

    #[tokio::test]
    async fn credential_too_small_is_insufficient() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "3");
        f.credential("cred1", "a1", "4");
        assert_eq!(
            f.build(&pay("10")).await.unwrap_err(),
            WalletError::InsufficientBalance {
                class: AssetClass::Primary,
                required: fx("10"),
                available: fx("7"),
            }
        );
    }

    #[tokio::test]
    async fn credential_covers_shortfall() {
        let mut f = Fixture::new();
        let pk = f.address("a1", AssetClass::Primary);
        f.unit("a1", "3");
        f.credential("cred1", "a1", "8");
        let outcome = f.build(&pay("10")).await.unwrap();
        let tx = outcome.transaction();
        assert_eq!(tx.tx_type, TxType::CredentialAssisted);
        assert_eq!(tx.credential_inputs.len(), 1);
        let cred = &tx.credential_inputs[0];
        let hash = credential_hash(cred).unwrap();
        verify_hash(&pk, &hash, cred.recipient_signature.as_ref().unwrap()).unwrap();
        assert_eq!(outcome.consumed_credentials, vec!["cred1"]);
        // 3 + 8 - 10
        assert_eq!(tx.outputs[1].value, fx("1"));
    }

    #[tokio::test]
    async fn pledge_never_uses_credentials() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "3");
        f.credential("cred1", "a1", "8");
        let mut b = pay("10");
        b.set_kind(TransferKind::Pledge);
        assert!(matches!(
            f.build(&b).await.unwrap_err(),
            WalletError::InsufficientBalance { .. }
        ));
    }

    #[tokio::test]
    async fn missing_key_is_hard_failure() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let empty = KeyRing::new();
        let err = pay("1").build(&f.wallet, &NoLocks, &empty).await.unwrap_err();
        assert_eq!(
            err,
            WalletError::KeyUnavailable {
                role: KeyRole::Input,
                id: "a1".into()
            }
        );
    }

    #[tokio::test]
    async fn cancelled_prompt_surfaces_as_cancelled() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let err = pay("1")
            .build(&f.wallet, &NoLocks, &CancellingKeys)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn wrong_key_for_address_is_rejected() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let mut keys = KeyRing::new();
        keys.generate_address("a1").unwrap();
        let err = pay("1").build(&f.wallet, &NoLocks, &keys).await.unwrap_err();
        assert_eq!(err, WalletError::KeyMismatch("a1".into()));
    }

    #[tokio::test]
    async fn out_of_range_prior_index_is_incomplete_data() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.wallet.addresses[0].units[0].prior_outputs.truncate(1);
        let err = f.build(&pay("1")).await.unwrap_err();
        match err {
            WalletError::IncompleteWalletData { unit, detail } => {
                assert!(unit.ends_with(":1"));
                assert!(detail.contains("out of range"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn disagreeing_prior_output_is_incomplete_data() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.wallet.addresses[0].units[0].prior_outputs[1].value = fx("7");
        assert!(matches!(
            f.build(&pay("1")).await.unwrap_err(),
            WalletError::IncompleteWalletData { .. }
        ));
    }

    #[tokio::test]
    async fn change_needs_matching_class_and_key() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let mut b = TransactionBuilder::new();
        b.add_recipient(Recipient::new("shop", fx("1"), AssetClass::Primary, foreign_key()));
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::UnmatchedChangeClass(AssetClass::Primary)
        );

        f.wallet
            .add_address(AddressRecord::new("keyless", AssetClass::Primary, None));
        b.add_change_address("keyless");
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::MissingPublicKey("keyless".into())
        );
    }

    #[tokio::test]
    async fn recipient_without_key_fails_validation() {
        let f = Fixture::new();
        let mut b = TransactionBuilder::new();
        b.add_recipient(Recipient {
            address: "shop".into(),
            amount: fx("1"),
            asset_class: AssetClass::Primary,
            public_key: None,
        });
        assert_eq!(
            f.build(&b).await.unwrap_err(),
            WalletError::MissingPublicKey("shop".into())
        );
    }

    #[test]
    fn validation_rejects_empty_and_zero() {
        assert!(matches!(
            TransactionBuilder::new().validate(),
            Err(WalletError::InvalidInput(_))
        ));
        let mut b = TransactionBuilder::new();
        b.add_recipient(Recipient::new("x", Fixed::ZERO, AssetClass::Primary, foreign_key()));
        assert!(matches!(b.validate(), Err(WalletError::InvalidAmount(_))));
        let mut b = pay("1");
        b.set_interest(fx("1"), fx("1.5"));
        assert!(matches!(b.validate(), Err(WalletError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn fee_conversion_output_is_last() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        let mut b = pay("4");
        b.set_fee_conversion(fx("0.5"));
        let outcome = f.build(&b).await.unwrap();
        let tx = outcome.transaction();
        assert_eq!(tx.outputs.len(), 3);
        assert_eq!(tx.outputs[1].value, fx("1.5"));
        let fee = tx.outputs.last().unwrap();
        assert!(fee.is_fee_conversion);
        assert_eq!(fee.value, fx("0.5"));
        assert_eq!(tx.class_value(AssetClass::Primary), fx("4.5"));
    }

    #[tokio::test]
    async fn multi_class_transfer_gets_change_per_class() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.address("b1", AssetClass::Secondary);
        f.unit("a1", "5");
        f.unit("b1", "5");
        let mut b = pay("2");
        b.add_recipient(Recipient::new("shop", fx("3"), AssetClass::Secondary, foreign_key()))
            .add_change_address("b1");
        let outcome = f.build(&b).await.unwrap();
        let tx = outcome.transaction();
        let change: Vec<_> = tx.outputs[2..].iter().map(|o| (o.asset_class, o.value)).collect();
        assert_eq!(
            change,
            vec![(AssetClass::Primary, fx("3")), (AssetClass::Secondary, fx("2"))]
        );
        assert_eq!(tx.value, fx("5"));
        assert_eq!(tx.value_by_class.len(), 3);
        assert_eq!(tx.class_value(AssetClass::Tertiary), Fixed::ZERO);
    }

    #[tokio::test]
    async fn interest_split_by_value_and_back_assigned() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.address("a2", AssetClass::Primary);
        f.unit("a1", "1");
        f.unit("a2", "2");
        let mut b = TransactionBuilder::new();
        b.add_recipient(Recipient::new("x", fx("1"), AssetClass::Primary, foreign_key()))
            .add_recipient(Recipient::new("y", fx("2"), AssetClass::Primary, foreign_key()))
            .set_interest(fx("1"), Fixed::ONE);
        let outcome = f.build(&b).await.unwrap();
        let tx = outcome.transaction();
        assert_eq!(tx.outputs[0].interest, fx("0.33333333"));
        assert_eq!(tx.outputs[1].interest, fx("0.66666667"));
        let ratios = &tx.interest.back_assignment;
        assert_eq!(ratios["a1"], fx("0.33333333"));
        assert_eq!(ratios["a2"], fx("0.66666667"));
        assert_eq!(Fixed::checked_sum(ratios.values().copied()), Some(Fixed::ONE));
        assert_eq!(tx.interest.amount, fx("1"));
    }

    #[tokio::test]
    async fn locked_units_are_not_spent_twice() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.unit("a1", "6");
        let locks = InFlightLocks::new();
        let first = pay("5").build(&f.wallet, &locks, &f.keys).await.unwrap();
        locks.lock_consumed(&first.consumed_units, &first.consumed_credentials);
        let second = pay("5").build(&f.wallet, &locks, &f.keys).await.unwrap();
        assert_ne!(first.consumed_units, second.consumed_units);
        assert!(pay("5").build(&f.wallet, &locks, &f.keys).await.is_ok());
        locks.lock_consumed(&second.consumed_units, &second.consumed_credentials);
        assert!(pay("5").build(&f.wallet, &locks, &f.keys).await.is_err());
    }

    #[tokio::test]
    async fn identical_builds_are_identical() {
        let mut f = Fixture::new();
        f.address("a1", AssetClass::Primary);
        f.unit("a1", "6");
        f.unit("a1", "5");
        let b = pay("10");
        let one = f.build(&b).await.unwrap();
        let two = f.build(&b).await.unwrap();
        assert_eq!(one.envelope, two.envelope);
    }
}

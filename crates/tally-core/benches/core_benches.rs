//! Criterion benchmarks for tally-core hot paths.
//!
//! Covers: canonical encoding, transaction hashing, P-256 sign/verify.

use std::collections::BTreeMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tally_core::amount::Fixed;
use tally_core::canonical;
use tally_core::crypto::{KeyPair, verify_hash};
use tally_core::hash::{sha256, transaction_hash};
use tally_core::types::{
    AssetClass, BlockPosition, Input, InterestAssignment, Output, Transaction, TxType,
};

fn sample_transaction(inputs: usize) -> Transaction {
    let key = KeyPair::generate().public_key().unwrap();
    Transaction {
        tx_id: String::new(),
        size: 0,
        version: 1,
        group_id: "bench".into(),
        tx_type: TxType::Plain,
        value: Fixed::from_coins(5).unwrap(),
        value_by_class: BTreeMap::from([("0".to_string(), Fixed::from_coins(5).unwrap())]),
        interest: InterestAssignment::default(),
        inputs: (0..inputs)
            .map(|i| Input {
                from_tx_id: format!("{i:016x}"),
                from_position: BlockPosition {
                    block: i as u64,
                    ..BlockPosition::default()
                },
                from_address: "sender".into(),
                is_credential_derived: false,
                is_issuer_made: false,
                output_hash: vec![0xAB; 32],
                signature: None,
            })
            .collect(),
        credential_inputs: vec![],
        outputs: vec![Output::payment(
            "recipient",
            Fixed::from_coins(5).unwrap(),
            AssetClass::Primary,
            key,
        )],
        signature: None,
        data: vec![],
    }
}

fn bench_encoding(c: &mut Criterion) {
    let tx = sample_transaction(16);
    c.bench_function("canonical_encode_16_inputs", |b| {
        b.iter(|| canonical::encode(black_box(&tx)).unwrap())
    });
    c.bench_function("transaction_hash_16_inputs", |b| {
        b.iter(|| transaction_hash(black_box(&tx)).unwrap())
    });
}

fn bench_signing(c: &mut Criterion) {
    let kp = KeyPair::generate();
    let pk = kp.public_key().unwrap();
    let hash = sha256(b"bench");
    let sig = kp.sign_hash(&hash).unwrap();
    c.bench_function("p256_sign_hash", |b| {
        b.iter(|| kp.sign_hash(black_box(&hash)).unwrap())
    });
    c.bench_function("p256_verify_hash", |b| {
        b.iter(|| verify_hash(black_box(&pk), black_box(&hash), black_box(&sig)).unwrap())
    });
}

criterion_group!(benches, bench_encoding, bench_signing);
criterion_main!(benches);

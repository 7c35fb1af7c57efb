//! In-process verifier speaking the submission and status protocol.
//!
//! Checks what the real verifier checks at the door: transaction ids,
//! input, credential and transaction signatures, group membership, revoked
//! addresses and double spends. Accepted transactions stay pending until
//! the test confirms or fails them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{Value, json};

use tally_client::{StatusReport, TxStatus};
use tally_core::crypto::verify_hash;
use tally_core::hash::{Hash256, credential_hash, derive_tx_id, transaction_hash};
use tally_core::types::{PublicKeyCoords, Transaction};
use tally_wallet::Envelope;

#[derive(Default)]
struct Ledger {
    address_keys: HashMap<String, PublicKeyCoords>,
    /// account -> (group, account key)
    members: HashMap<String, (String, PublicKeyCoords)>,
    revoked: HashSet<String>,
    spent: HashSet<String>,
    statuses: HashMap<String, StatusReport>,
    submissions: Vec<Envelope>,
}

/// Handle to a running verifier.
#[derive(Clone, Default)]
pub struct MockVerifier {
    ledger: Arc<Mutex<Ledger>>,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an address's public key known.
    pub fn register_address(&self, address: &str, key: PublicKeyCoords) {
        self.ledger.lock().address_keys.insert(address.to_string(), key);
    }

    pub fn register_member(&self, account: &str, group: &str, key: PublicKeyCoords) {
        self.ledger
            .lock()
            .members
            .insert(account.to_string(), (group.to_string(), key));
    }

    pub fn revoke(&self, address: &str) {
        self.ledger.lock().revoked.insert(address.to_string());
    }

    pub fn confirm(&self, tx_id: &str, block_height: u64) {
        self.ledger
            .lock()
            .statuses
            .insert(tx_id.to_string(), StatusReport::success(block_height));
    }

    pub fn fail(&self, tx_id: &str, reason: &str) {
        self.ledger
            .lock()
            .statuses
            .insert(tx_id.to_string(), StatusReport::failed(reason));
    }

    pub fn submissions(&self) -> Vec<Envelope> {
        self.ledger.lock().submissions.clone()
    }

    /// Serve on an ephemeral local port and return the base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/api/v1/groups/:group/transactions", post(group_submit))
            .route("/api/v1/retail/transactions", post(retail_submit))
            .route("/api/v1/groups/:group/transactions/:tx_id/status", get(status))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind verifier");
        let addr = listener.local_addr().expect("verifier address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn accept(&self, envelope: Envelope, path_group: Option<&str>) -> Result<String, String> {
        let mut ledger = self.ledger.lock();
        match (&envelope, path_group) {
            (Envelope::Individual(env), Some(group)) => {
                match ledger.members.get(&env.submitter) {
                    Some((member_of, key)) if member_of == group && env.group_id == group => {
                        env.verify(key)
                            .map_err(|_| "envelope signature verification failed".to_string())?;
                    }
                    _ => {
                        return Err(format!(
                            "submitter {} is not a member of group {group}",
                            env.submitter
                        ));
                    }
                }
            }
            (Envelope::Aggregate(env), None) => {
                if !env.hash_matches().unwrap_or(false) {
                    return Err("aggregate hash mismatch".into());
                }
            }
            _ => return Err("envelope kind does not match endpoint".into()),
        }

        let mut spending = Vec::new();
        for tx in envelope.transactions() {
            check_transaction(&ledger, tx)?;
            for input in &tx.inputs {
                let key = format!("{}:{:?}", input.from_tx_id, input.from_position);
                if ledger.spent.contains(&key) || spending.contains(&key) {
                    return Err(format!("double spend: input {key} already spent"));
                }
                spending.push(key);
            }
            for credential in &tx.credential_inputs {
                let key = format!("credential:{}", credential.id);
                if ledger.spent.contains(&key) || spending.contains(&key) {
                    return Err(format!("double spend: credential {} already spent", credential.id));
                }
                spending.push(key);
            }
        }

        ledger.spent.extend(spending);
        let ids: Vec<String> = envelope.transactions().iter().map(|tx| tx.tx_id.clone()).collect();
        for id in &ids {
            ledger.statuses.insert(id.clone(), StatusReport::pending());
        }
        ledger.submissions.push(envelope);
        Ok(ids.into_iter().next().unwrap_or_default())
    }
}

fn check_transaction(ledger: &Ledger, tx: &Transaction) -> Result<(), String> {
    let key_of = |address: &str| -> Result<&PublicKeyCoords, String> {
        if ledger.revoked.contains(address) {
            return Err(format!("address {address} revoked"));
        }
        ledger
            .address_keys
            .get(address)
            .ok_or_else(|| format!("unknown address {address}"))
    };

    let hash = transaction_hash(tx).map_err(|e| e.to_string())?;
    if derive_tx_id(&hash) != tx.tx_id {
        return Err(format!("transaction {} signature covers different contents", tx.tx_id));
    }

    for input in &tx.inputs {
        let key = key_of(&input.from_address)?;
        let output_hash = <[u8; 32]>::try_from(input.output_hash.as_slice())
            .map(Hash256)
            .map_err(|_| "malformed output hash".to_string())?;
        let sig = input.signature.as_ref().ok_or("input signature missing")?;
        verify_hash(key, &output_hash, sig)
            .map_err(|_| format!("input signature from {} invalid", input.from_address))?;
    }

    for credential in &tx.credential_inputs {
        let key = key_of(&credential.recipient)?;
        let sig = credential
            .recipient_signature
            .as_ref()
            .ok_or("credential signature missing")?;
        let hash = credential_hash(credential).map_err(|e| e.to_string())?;
        verify_hash(key, &hash, sig)
            .map_err(|_| format!("credential {} signature invalid", credential.id))?;
    }

    let signer = tx
        .inputs
        .first()
        .map(|i| i.from_address.as_str())
        .or_else(|| tx.credential_inputs.first().map(|c| c.recipient.as_str()))
        .ok_or("transaction has no inputs")?;
    let sig = tx.signature.as_ref().ok_or("transaction signature missing")?;
    verify_hash(key_of(signer)?, &hash, sig)
        .map_err(|_| "transaction signature invalid".to_string())?;
    Ok(())
}

fn reply(result: Result<String, String>) -> axum::Json<Value> {
    axum::Json(match result {
        Ok(tx_id) => json!({ "success": true, "txId": tx_id }),
        Err(error) => json!({ "success": false, "txId": "", "error": error }),
    })
}

async fn group_submit(
    State(verifier): State<MockVerifier>,
    Path(group): Path<String>,
    body: Bytes,
) -> axum::Json<Value> {
    reply(
        Envelope::decode(&body)
            .map_err(|e| e.to_string())
            .and_then(|env| verifier.accept(env, Some(&group))),
    )
}

async fn retail_submit(State(verifier): State<MockVerifier>, body: Bytes) -> axum::Json<Value> {
    reply(
        Envelope::decode(&body)
            .map_err(|e| e.to_string())
            .and_then(|env| verifier.accept(env, None)),
    )
}

async fn status(
    State(verifier): State<MockVerifier>,
    Path((_group, tx_id)): Path<(String, String)>,
) -> (StatusCode, axum::Json<StatusReport>) {
    let report = verifier
        .ledger
        .lock()
        .statuses
        .get(&tx_id)
        .cloned()
        .unwrap_or(StatusReport {
            status: TxStatus::NotFound,
            verified: false,
            error_reason: None,
            block_height: 0,
        });
    (StatusCode::OK, axum::Json(report))
}

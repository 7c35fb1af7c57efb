//! HTTP client for the submission and status endpoints.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use tally_core::constants::RETAIL_GROUP;
use tally_wallet::Envelope;

use crate::config::ClientConfig;
use crate::error::{RejectCode, SubmissionError};
use crate::status::{StatusReport, SubmitResponse};
use crate::tracker::StatusSource;

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub tx_id: String,
}

/// Submits envelopes and queries transaction status.
#[derive(Debug, Clone)]
pub struct SubmitClient {
    client: Client,
    base_url: String,
}

impl SubmitClient {
    pub fn new(config: &ClientConfig) -> Result<Self, SubmissionError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Path an envelope is posted to.
    pub fn submit_path(envelope: &Envelope) -> String {
        match envelope.group_id() {
            Some(group) => format!("/api/v1/groups/{group}/transactions"),
            None => format!("/api/v1/{RETAIL_GROUP}/transactions"),
        }
    }

    /// Path of the status endpoint. Retail transactions use the `retail`
    /// group.
    pub fn status_path(group: &str, tx_id: &str) -> String {
        format!("/api/v1/groups/{group}/transactions/{tx_id}/status")
    }

    /// Post the canonical envelope bytes. Never retried.
    pub async fn submit(&self, envelope: &Envelope) -> Result<SubmitReceipt, SubmissionError> {
        let body = envelope.encode()?;
        let url = format!("{}{}", self.base_url, Self::submit_path(envelope));
        debug!(%url, bytes = body.len(), "submitting envelope");

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;

        let parsed = match serde_json::from_str::<SubmitResponse>(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(SubmissionError::HttpStatus {
                    status: status.as_u16(),
                    body: text,
                });
            }
            Err(e) => return Err(SubmissionError::Decode(e.to_string())),
        };

        if !parsed.success {
            let message = parsed.error.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                code: RejectCode::classify(parsed.code.as_deref(), &message),
                message,
            });
        }

        let local: Vec<&str> = envelope
            .transactions()
            .iter()
            .map(|tx| tx.tx_id.as_str())
            .collect();
        if !local.contains(&parsed.tx_id.as_str()) {
            warn!(remote = %parsed.tx_id, ?local, "verifier acknowledged a different transaction id");
        }
        Ok(SubmitReceipt {
            tx_id: parsed.tx_id,
        })
    }

    /// Query the status of one transaction.
    pub async fn status(&self, group: &str, tx_id: &str) -> Result<StatusReport, SubmissionError> {
        let url = format!("{}{}", self.base_url, Self::status_path(group, tx_id));
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SubmissionError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| SubmissionError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for SubmitClient {
    async fn status(&self, group: &str, tx_id: &str) -> Result<StatusReport, SubmissionError> {
        SubmitClient::status(self, group, tx_id).await
    }
}

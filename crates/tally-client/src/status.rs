//! Status reports, push events and submission responses.

use serde::{Deserialize, Serialize};

/// Verifier-side state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
    NotFound,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: TxStatus,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub block_height: u64,
}

impl StatusReport {
    pub fn pending() -> Self {
        Self {
            status: TxStatus::Pending,
            verified: false,
            error_reason: None,
            block_height: 0,
        }
    }

    pub fn success(block_height: u64) -> Self {
        Self {
            status: TxStatus::Success,
            verified: true,
            error_reason: None,
            block_height,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: TxStatus::Failed,
            verified: false,
            error_reason: Some(reason.into()),
            block_height: 0,
        }
    }
}

/// A status change delivered over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub transaction_id: String,
    pub status: TxStatus,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub error_reason: Option<String>,
}

/// Response of the submission endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub tx_id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_report_decodes_wire_names() {
        let r: StatusReport = serde_json::from_str(
            r#"{"status":"not_found","verified":false,"errorReason":null,"blockHeight":0}"#,
        )
        .unwrap();
        assert_eq!(r.status, TxStatus::NotFound);
        let r: StatusReport =
            serde_json::from_str(r#"{"status":"success","verified":true,"blockHeight":12}"#).unwrap();
        assert_eq!(r, StatusReport::success(12));
    }

    #[test]
    fn push_event_decodes() {
        let e: PushEvent = serde_json::from_str(
            r#"{"transactionId":"ab","status":"failed","blockHeight":0,"errorReason":"double spend"}"#,
        )
        .unwrap();
        assert_eq!(e.status, TxStatus::Failed);
        assert_eq!(e.error_reason.as_deref(), Some("double spend"));
    }

    #[test]
    fn submit_response_optional_fields() {
        let r: SubmitResponse = serde_json::from_str(r#"{"success":true,"txId":"ab"}"#).unwrap();
        assert!(r.success);
        assert!(r.error.is_none() && r.code.is_none());
    }
}

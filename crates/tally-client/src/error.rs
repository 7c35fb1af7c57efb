//! Client error types.

use std::fmt;
use std::time::Duration;

use tally_core::error::EncodeError;
use thiserror::Error;

/// Why the verifier refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    /// Submitter is not a member of the group it submitted to.
    NotAMember,
    /// A signing address has been revoked.
    AddressRevoked,
    /// A signature did not verify.
    SignatureRejected,
    /// An input was already spent.
    DoubleSpend,
    Other,
}

impl RejectCode {
    /// Classify a rejection from the verifier's code and error string.
    pub fn classify(code: Option<&str>, error: &str) -> Self {
        let text = format!("{} {}", code.unwrap_or_default(), error).to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
        if has(&["not a member", "not_member", "not-member", "membership"]) {
            Self::NotAMember
        } else if has(&["revoked"]) {
            Self::AddressRevoked
        } else if has(&["double spend", "double_spend", "double-spend", "already spent"]) {
            Self::DoubleSpend
        } else if has(&["signature"]) {
            Self::SignatureRejected
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotAMember => "not-a-member",
            Self::AddressRevoked => "address-revoked",
            Self::SignatureRejected => "signature-rejected",
            Self::DoubleSpend => "double-spend",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors from the submission and status endpoints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The request could not be sent or the connection failed.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status without a parseable body.
    #[error("endpoint returned HTTP {status}: {body}")]
    HttpStatus {
        status: u16,
        body: String,
    },

    /// The verifier refused the transaction.
    #[error("verifier rejected transaction ({code}): {message}")]
    Rejected {
        code: RejectCode,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The envelope could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<reqwest::Error> for SubmissionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Errors from confirmation tracking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// No terminal report arrived in time.
    #[error("confirmation of {tx_id} timed out after {after:?}")]
    Timeout { tx_id: String, after: Duration },

    /// The tracker service was stopped.
    #[error("tracker stopped")]
    Stopped,

    /// Both observation channels ended.
    #[error("status channels closed")]
    ChannelsClosed,
}

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

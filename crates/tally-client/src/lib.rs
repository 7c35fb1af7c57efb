//! # tally-client — talking to the ledger verifier.
//!
//! Posts signed envelopes, queries transaction status and tracks
//! confirmation over a push channel with polling as fallback.
//!
//! # Modules
//!
//! - [`config`] — endpoint and tracker timing, overridable from the environment
//! - [`error`] — submission, tracking and config errors
//! - [`status`] — wire types of the status and submission endpoints
//! - [`http`] — `SubmitClient` over reqwest
//! - [`tracker`] — `ConfirmationTracker` service

pub mod config;
pub mod error;
pub mod http;
pub mod status;
pub mod tracker;

pub use config::{ClientConfig, TrackerConfig};
pub use error::{ConfigError, RejectCode, SubmissionError, TrackError};
pub use http::{SubmitClient, SubmitReceipt};
pub use status::{PushEvent, StatusReport, SubmitResponse, TxStatus};
pub use tracker::{
    Channel, ConfirmationTracker, Resolution, StatusSource, TrackOutcome, TrackRequest,
    first_poll_delay,
};

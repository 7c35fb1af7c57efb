//! Client and tracker configuration.
//!
//! Both structs have sensible defaults; `from_env` overrides individual
//! fields from `TALLY_*` environment variables.

use std::time::Duration;

use crate::error::ConfigError;

/// Connection settings for the verifier endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load from `TALLY_ENDPOINT` and `TALLY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TALLY_ENDPOINT") {
            config.base_url = url;
        }
        if let Some(timeout) = env_secs("TALLY_TIMEOUT_SECS")? {
            config.request_timeout = timeout;
        }
        Ok(config)
    }
}

/// Timing of confirmation tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay between status pulls.
    pub poll_interval: Duration,
    /// How long pulling waits for the push channel when it is live.
    pub push_grace: Duration,
    /// How long a terminal first pull waits for push confirmation.
    pub corroboration_grace: Duration,
    /// Overall deadline for one tracking call.
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            push_grace: Duration::from_secs(15),
            corroboration_grace: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

impl TrackerConfig {
    /// Load from `TALLY_POLL_SECS`, `TALLY_PUSH_GRACE_SECS`,
    /// `TALLY_CORROBORATION_SECS` and `TALLY_TRACK_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_secs("TALLY_POLL_SECS")? {
            config.poll_interval = v;
        }
        if let Some(v) = env_secs("TALLY_PUSH_GRACE_SECS")? {
            config.push_grace = v;
        }
        if let Some(v) = env_secs("TALLY_CORROBORATION_SECS")? {
            config.corroboration_grace = v;
        }
        if let Some(v) = env_secs("TALLY_TRACK_TIMEOUT_SECS")? {
            config.timeout = v;
        }
        Ok(config)
    }
}

fn env_secs(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_secs(name, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError {
            name,
            value: value.to_string(),
        })
}

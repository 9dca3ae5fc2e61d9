//! Configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Where validity proofs come from
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProverMode {
    /// Return the locally computed public inputs without proving
    #[default]
    Mock,
    /// Request proofs from the remote validity prover
    Remote,
}

impl ProverMode {
    pub const fn is_mock(self) -> bool {
        matches!(self, Self::Mock)
    }
}

impl From<&str> for ProverMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "remote" => Self::Remote,
            _ => Self::Mock,
        }
    }
}

/// Host configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the validity prover
    pub prover_url: String,
    pub prover_mode: ProverMode,
    /// Seconds to wait when no new block is available
    pub fetch_interval: u64,
    /// Seconds between proof status polls
    pub proof_poll_interval: u64,
    /// Polls before a proof request is abandoned
    pub proof_poll_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prover_url: "http://localhost:9001".to_string(),
            prover_mode: ProverMode::Mock,
            fetch_interval: 10,
            proof_poll_interval: 5,
            proof_poll_max_attempts: 120,
        }
    }
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prover_url: env::var("VALIDITY_PROVER_URL").unwrap_or(defaults.prover_url),
            prover_mode: env::var("PROVER_MODE")
                .map(|s| ProverMode::from(s.as_str()))
                .unwrap_or_default(),
            fetch_interval: env::var("FETCH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_interval),
            proof_poll_interval: env::var("PROOF_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.proof_poll_interval),
            proof_poll_max_attempts: env::var("PROOF_POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.proof_poll_max_attempts),
        }
    }

    pub const fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval)
    }

    pub const fn proof_poll_interval(&self) -> Duration {
        Duration::from_secs(self.proof_poll_interval)
    }
}

//! Console client configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::relay::RelayConfig;
use super::serde_utils::duration_secs;

/// Configuration for the `px-console` client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// API base URL, e.g. `https://pve.example.com:8006`
    pub endpoint: Option<String>,

    /// Default user the console ticket is issued to
    pub user: Option<String>,

    /// Verify the server certificate
    pub validate_tls: bool,

    /// Extra headers sent with the websocket upgrade request
    pub headers: BTreeMap<String, String>,

    /// Retry policy for opening the tunnel
    pub backoff: BackoffConfig,

    /// Session parameters
    pub relay: RelayConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user: None,
            validate_tls: true,
            headers: BTreeMap::new(),
            backoff: BackoffConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Connection attempts before giving up (1 = no retry)
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
            max_attempts: 1,
        }
    }
}

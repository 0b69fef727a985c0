//! Relay session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use px_protocol::AckPolicy;

use super::serde_utils::duration_secs;

/// Timing and buffering parameters for one console session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interval between keepalive frames
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Interval between local terminal size checks
    #[serde(with = "duration_secs")]
    pub resize_poll_interval: Duration,

    /// Bound on opening the tunnel
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How long `close()` waits for background tasks to exit
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,

    /// Reported errors buffered before new ones are dropped
    pub error_capacity: usize,

    /// Validation applied to the handshake reply
    pub ack: AckPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            resize_poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(1),
            error_capacity: 32,
            ack: AckPolicy::default(),
        }
    }
}

//! Core error types for pxterm

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// WebSocket close codes the relay distinguishes
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (server shutdown, page navigation)
    pub const GOING_AWAY: u16 = 1001;
    /// Connection dropped without a close frame
    pub const ABNORMAL: u16 = 1006;
}

/// Failures of the underlying tunnel connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was already closed from this side
    #[error("Connection already closed")]
    LocallyClosed,

    /// The peer closed the connection
    #[error("Connection closed by peer (code {code:?}): {reason}")]
    PeerClosed { code: Option<u16>, reason: String },

    /// Connection attempt timed out
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Target could not be turned into a request
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// TLS setup or negotiation failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Transport-level protocol violation
    #[error("Transport protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this is an expected peer-initiated close (going away or
    /// abnormal closure). Any other close code, including a normal close or
    /// one with no status, is unexpected.
    pub fn is_benign_close(&self) -> bool {
        matches!(
            self,
            TransportError::PeerClosed {
                code: Some(close_code::GOING_AWAY | close_code::ABNORMAL),
                ..
            }
        )
    }
}

/// Console relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Opening the tunnel failed
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: TransportError,
    },

    /// The server did not acknowledge the credential line
    #[error("Authentication rejected: {reason}")]
    Auth { reason: String },

    /// A single frame write failed
    #[error("Failed to write {frame} frame: {source}")]
    Write {
        frame: &'static str,
        #[source]
        source: TransportError,
    },

    /// Reading from the tunnel failed
    #[error("Read failed: {0}")]
    Read(#[source] TransportError),

    /// Operation on a session that was already closed
    #[error("Session is closed")]
    Closed,

    /// Background tasks did not exit within the shutdown bound
    #[error("{pending} background task(s) still running after {timeout:?}")]
    ShutdownTimeout { pending: usize, timeout: Duration },
}

impl RelayError {
    /// Whether a fresh attempt could succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Connect { .. })
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_closed(code: Option<u16>) -> TransportError {
        TransportError::PeerClosed {
            code,
            reason: String::new(),
        }
    }

    #[test]
    fn test_benign_close_codes() {
        assert!(peer_closed(Some(close_code::GOING_AWAY)).is_benign_close());
        assert!(peer_closed(Some(close_code::ABNORMAL)).is_benign_close());
        assert!(!peer_closed(Some(close_code::NORMAL)).is_benign_close());
        assert!(!peer_closed(None).is_benign_close());
        assert!(!peer_closed(Some(1011)).is_benign_close());
        assert!(!TransportError::Io("reset".into()).is_benign_close());
        assert!(!TransportError::LocallyClosed.is_benign_close());
    }

    #[test]
    fn test_only_connect_is_retryable() {
        let connect = RelayError::Connect {
            target: "wss://pve".into(),
            source: TransportError::Timeout(Duration::from_secs(30)),
        };
        assert!(connect.is_retryable());
        assert!(!RelayError::Auth {
            reason: "bad ticket".into()
        }
        .is_retryable());
        assert!(!RelayError::Closed.is_retryable());
    }
}

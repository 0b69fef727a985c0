//! Tunnel authentication line and acknowledgement

use serde::{Deserialize, Serialize};
use std::fmt;

/// Acknowledgement the console proxy sends after accepting a ticket
pub const AUTH_ACK: &str = "OK";

/// Console access credential: the user the ticket was issued to and
/// the ticket itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user: String,
    ticket: String,
}

impl Credential {
    /// Create a new credential
    pub fn new(user: impl Into<String>, ticket: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ticket: ticket.into(),
        }
    }

    /// User (usually `user@realm`)
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Console ticket
    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    /// First message of every tunnel: `<user>:<ticket>\n`
    pub fn auth_line(&self) -> String {
        format!("{}:{}\n", self.user, self.ticket)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("ticket", &"<redacted>")
            .finish()
    }
}

/// How the reply to the credential line is validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AckPolicy {
    /// Reply must equal a fixed acknowledgement text
    Sentinel {
        /// Expected reply
        text: String,
    },
    /// Reply must echo the credential line back byte for byte
    Echo,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Sentinel {
            text: AUTH_ACK.to_string(),
        }
    }
}

impl AckPolicy {
    /// Check a server reply against this policy
    pub fn accepts(&self, credential: &Credential, reply: &[u8]) -> bool {
        match self {
            AckPolicy::Sentinel { text } => reply == text.as_bytes(),
            AckPolicy::Echo => reply == credential.auth_line().as_bytes(),
        }
    }
}

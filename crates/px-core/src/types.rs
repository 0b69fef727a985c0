//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::ConfigError;

/// Address of one console tunnel endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target(String);

impl Target {
    /// Create a new target from a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the raw URL string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tickets travel in the query string; keep them out of logs
        match self.0.split_once('?') {
            Some((base, _)) => write!(f, "{}?...", base),
            None => f.write_str(&self.0),
        }
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which console on a cluster node to attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsoleTarget {
    /// Host shell of the node itself
    Node { node: String },
    /// Serial console of a QEMU virtual machine
    Qemu { node: String, vmid: u32 },
    /// Console of an LXC container
    Lxc { node: String, vmid: u32 },
}

impl ConsoleTarget {
    /// API path of the console websocket, relative to `/api2/json`
    pub fn path(&self) -> String {
        match self {
            ConsoleTarget::Node { node } => format!("/nodes/{}/vncwebsocket", node),
            ConsoleTarget::Qemu { node, vmid } => {
                format!("/nodes/{}/qemu/{}/vncwebsocket", node, vmid)
            }
            ConsoleTarget::Lxc { node, vmid } => {
                format!("/nodes/{}/lxc/{}/vncwebsocket", node, vmid)
            }
        }
    }

    /// Build the full websocket URL on `endpoint` for a proxy `port` and
    /// console `ticket`
    pub fn to_target(&self, endpoint: &str, port: u16, ticket: &str) -> Result<Target, ConfigError> {
        let base = format!("{}/api2/json{}", endpoint.trim_end_matches('/'), self.path());
        let mut url = Url::parse(&base)
            .map_err(|e| ConfigError::Invalid(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        let ws_scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Unsupported endpoint scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(ws_scheme)
            .map_err(|_| ConfigError::Invalid(format!("Cannot use scheme {}", ws_scheme)))?;

        url.query_pairs_mut()
            .append_pair("port", &port.to_string())
            .append_pair("vncticket", ticket);

        Ok(Target::new(String::from(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_paths() {
        let node = ConsoleTarget::Node {
            node: "pve1".into(),
        };
        let qemu = ConsoleTarget::Qemu {
            node: "pve1".into(),
            vmid: 100,
        };
        let lxc = ConsoleTarget::Lxc {
            node: "pve1".into(),
            vmid: 201,
        };

        assert_eq!(node.path(), "/nodes/pve1/vncwebsocket");
        assert_eq!(qemu.path(), "/nodes/pve1/qemu/100/vncwebsocket");
        assert_eq!(lxc.path(), "/nodes/pve1/lxc/201/vncwebsocket");
    }

    #[test]
    fn test_to_target_escapes_ticket() {
        let qemu = ConsoleTarget::Qemu {
            node: "pve1".into(),
            vmid: 100,
        };
        let target = qemu
            .to_target("https://pve.lan:8006/", 5900, "PVEVNC:AB+C/D=")
            .unwrap();

        assert_eq!(
            target.as_str(),
            "wss://pve.lan:8006/api2/json/nodes/pve1/qemu/100/vncwebsocket?port=5900&vncticket=PVEVNC%3AAB%2BC%2FD%3D"
        );
    }

    #[test]
    fn test_to_target_plain_http() {
        let node = ConsoleTarget::Node {
            node: "n".into(),
        };
        let target = node.to_target("http://127.0.0.1:8006", 1, "t").unwrap();
        assert!(target.as_str().starts_with("ws://127.0.0.1:8006/"));
    }

    #[test]
    fn test_to_target_rejects_bad_endpoint() {
        let node = ConsoleTarget::Node {
            node: "n".into(),
        };
        assert!(node.to_target("ftp://pve", 1, "t").is_err());
        assert!(node.to_target("not a url", 1, "t").is_err());
    }

    #[test]
    fn test_target_display_hides_query() {
        let target = Target::new("wss://pve/api2/json/nodes/n/vncwebsocket?port=1&vncticket=secret");
        assert_eq!(
            target.to_string(),
            "wss://pve/api2/json/nodes/n/vncwebsocket?..."
        );
    }
}

//! Command-line arguments and how they combine with the config file

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use px_core::config::{self, ConsoleConfig};
use px_core::{ConfigError, ConsoleTarget, Target};
use px_protocol::Credential;

#[derive(Parser, Debug)]
#[command(name = "px-console")]
#[command(author, version, about = "Attach to a Proxmox VE console over a websocket tunnel")]
pub struct Cli {
    /// API base URL, e.g. https://pve.example.com:8006
    #[arg(short, long, env = "PX_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Full websocket URL of the console (instead of endpoint/node/vmid)
    #[arg(long, conflicts_with_all = ["endpoint", "node", "vmid", "port"])]
    pub url: Option<String>,

    /// Cluster node hosting the console
    #[arg(short, long)]
    pub node: Option<String>,

    /// Console type
    #[arg(long, value_enum, default_value_t = ConsoleKind::Node)]
    pub kind: ConsoleKind,

    /// Guest ID for qemu and lxc consoles
    #[arg(long)]
    pub vmid: Option<u32>,

    /// Proxy port returned by the termproxy call
    #[arg(short, long)]
    pub port: Option<u16>,

    /// User the console ticket was issued to
    #[arg(short, long)]
    pub user: Option<String>,

    /// One-time console ticket
    #[arg(long, env = "PX_TICKET", hide_env_values = true)]
    pub ticket: String,

    /// Extra upgrade request header as NAME=VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Skip server certificate validation
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Extra connection attempts when the tunnel cannot be opened
    #[arg(long)]
    pub retries: Option<u32>,
}

/// Console type on a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsoleKind {
    /// Host shell of the node
    Node,
    /// QEMU virtual machine
    Qemu,
    /// LXC container
    Lxc,
}

/// Everything needed to open the console
#[derive(Debug)]
pub struct ConnectRequest {
    pub target: Target,
    pub credential: Credential,
    pub config: ConsoleConfig,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

impl Cli {
    /// Load the config file named by `--config`, or the default one if it
    /// exists
    pub fn load_config(&self) -> Result<ConsoleConfig> {
        match &self.config {
            Some(path) => config::load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display())),
            None => match config::load_config(&config::default_config_path()) {
                Ok(config) => Ok(config),
                Err(ConfigError::NotFound(_)) => Ok(ConsoleConfig::default()),
                Err(e) => Err(e).context("Failed to load default config"),
            },
        }
    }

    /// Apply flags on top of `config` and resolve the console address
    pub fn into_request(self, mut config: ConsoleConfig) -> Result<ConnectRequest> {
        if self.insecure {
            config.validate_tls = false;
        }
        if let Some(retries) = self.retries {
            config.backoff.max_attempts = retries.saturating_add(1);
        }
        config.headers.extend(self.headers);
        if let Some(endpoint) = self.endpoint {
            config.endpoint = Some(endpoint);
        }
        if let Some(user) = self.user {
            config.user = Some(user);
        }

        let user = config
            .user
            .clone()
            .context("No user given; pass --user or set `user` in the config file")?;

        let target = match self.url {
            Some(url) => Target::new(url),
            None => {
                let endpoint = config
                    .endpoint
                    .as_deref()
                    .context("No endpoint given; pass --endpoint or --url")?;
                let node = self.node.context("--node is required without --url")?;
                let port = self.port.context("--port is required without --url")?;
                let console = match (self.kind, self.vmid) {
                    (ConsoleKind::Node, _) => ConsoleTarget::Node { node },
                    (ConsoleKind::Qemu, Some(vmid)) => ConsoleTarget::Qemu { node, vmid },
                    (ConsoleKind::Lxc, Some(vmid)) => ConsoleTarget::Lxc { node, vmid },
                    (kind, None) => bail!("--vmid is required for {:?} consoles", kind),
                };
                console.to_target(endpoint, port, &self.ticket)?
            }
        };

        Ok(ConnectRequest {
            target,
            credential: Credential::new(user, self.ticket),
            config,
        })
    }
}

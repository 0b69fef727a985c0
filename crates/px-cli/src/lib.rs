//! px-console: attach a local terminal to a Proxmox VE console
//!
//! Argument handling, the raw-mode terminal loop and status output for
//! the `px-console` binary.

pub mod args;
pub mod output;
pub mod terminal;

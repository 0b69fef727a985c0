//! px-core: Core abstractions and configuration for pxterm
//!
//! This crate provides the error taxonomy, configuration structures and
//! the collaborator traits (transport, terminal size) that the relay is
//! written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{close_code, ConfigError, RelayError, TransportError};
pub use types::{ConsoleTarget, Target};

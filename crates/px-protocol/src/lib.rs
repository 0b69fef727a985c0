//! px-protocol: Wire framing for the pxterm console relay
//!
//! This crate defines the text-oriented framing spoken over a console
//! tunnel: terminal data, terminal resize notifications and keepalive
//! pings, plus the credential line that opens every tunnel.

pub mod codec;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod size;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{
    encode_data, encode_keepalive, encode_resize, Frame, FrameTag, DATA_TERMINATOR,
    MAX_PAYLOAD_SIZE,
};
pub use handshake::{AckPolicy, Credential, AUTH_ACK};
pub use size::TerminalSize;

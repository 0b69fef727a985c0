//! Protocol error types

use thiserror::Error;

/// Errors that can occur while parsing console frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// First byte of a frame is not one of the known tags
    #[error("Unknown frame tag: {0:#04x}")]
    UnknownTag(u8),

    /// A numeric header field is missing or not a decimal number
    #[error("Invalid {field} field in frame header")]
    InvalidField { field: &'static str },

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// A single message held more bytes than one frame
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Message ended before the frame was complete
    #[error("Incomplete frame")]
    Incomplete,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

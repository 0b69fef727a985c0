//! Transport traits
//!
//! A connection is handed to the relay already split into its two
//! halves so that exactly one task can own each.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::types::Target;

/// Write half of a tunnel connection
#[async_trait]
pub trait TransportSink: Send {
    /// Write one message
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError>;

    /// Send the transport's close control frame
    async fn send_close(&mut self) -> Result<(), TransportError>;

    /// Flush pending writes and release the write half
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a tunnel connection
#[async_trait]
pub trait TransportStream: Send {
    /// Receive the next message, returning `None` when the stream ends
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>>;
}

/// Opens tunnel connections to console targets
#[async_trait]
pub trait Connector: Send + Sync {
    /// Write half produced by this connector
    type Sink: TransportSink + 'static;
    /// Read half produced by this connector
    type Stream: TransportStream + 'static;

    /// Open a connection, authenticated at the transport level
    async fn connect(&self, target: &Target) -> Result<(Self::Sink, Self::Stream), TransportError>;
}

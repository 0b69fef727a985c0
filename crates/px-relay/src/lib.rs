//! px-relay: Console relay over a single websocket tunnel
//!
//! A [`ConsoleRelay`] opens a tunnel, authenticates with a one-time
//! ticket and returns a [`Session`]. Each session runs three tasks that
//! share one connection: a reader forwarding inbound bytes, a writer
//! owning the write half (data, resize and keepalive frames), and a
//! watcher polling the local terminal size.

mod errors;
pub mod handshake;
mod mux;
pub mod reconnect;
pub mod relay;
pub mod session;
pub mod transport;
mod watcher;

#[cfg(test)]
mod testing;

pub use errors::ErrorStream;
pub use reconnect::ExponentialBackoff;
pub use relay::ConsoleRelay;
pub use session::{Inbound, Session};
pub use transport::WebSocketConnector;

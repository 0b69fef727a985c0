//! Concrete tunnel transports

pub mod tls;
pub mod ws;

pub use ws::{http_to_ws_scheme, WebSocketConnector, WsSink, WsSource};

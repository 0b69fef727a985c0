//! WebSocket transport
//!
//! Thin wrapper around `tokio-tungstenite` that hands the relay split
//! write and read halves. Text and binary messages are both delivered as
//! raw bytes; control frames are handled by tungstenite and never reach
//! the relay.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::Connector as TlsConnector;

use px_core::close_code;
use px_core::config::ConsoleConfig;
use px_core::traits::{Connector, TransportSink, TransportStream};
use px_core::{Target, TransportError};

use super::tls;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of a websocket connection
pub struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(message.to_vec()))
            .await
            .map_err(map_ws_error)
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) => Ok(()),
            // Closing after the handshake already finished is fine
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

/// Read half of a websocket connection
pub struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsSource {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text.into_bytes()))),
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Some(Err(TransportError::PeerClosed { code, reason }));
                }
                Err(e) => return Some(Err(map_ws_error(e))),
            }
        }
    }
}

/// Map a tungstenite error into the transport taxonomy
fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::SendAfterClosing) => {
            TransportError::LocallyClosed
        }
        tungstenite::Error::Io(e) => TransportError::Io(e.to_string()),
        tungstenite::Error::Tls(e) => TransportError::Tls(e.to_string()),
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::PeerClosed {
                code: Some(close_code::ABNORMAL),
                reason: "connection reset without closing handshake".to_string(),
            }
        }
        tungstenite::Error::Url(e) => TransportError::InvalidTarget(e.to_string()),
        tungstenite::Error::Http(response) => {
            TransportError::Protocol(format!("upgrade rejected with HTTP {}", response.status()))
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

/// Opens websocket tunnels
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    headers: Vec<(String, String)>,
    validate_tls: bool,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnector {
    /// Create a connector that validates certificates and sends no extra
    /// headers
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            validate_tls: true,
        }
    }

    /// Create a connector from client configuration
    pub fn from_config(config: &ConsoleConfig) -> Self {
        let mut connector = Self::new().validate_tls(config.validate_tls);
        for (name, value) in &config.headers {
            connector = connector.header(name.clone(), value.clone());
        }
        connector
    }

    /// Add a header to the upgrade request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Enable or disable server certificate validation
    pub fn validate_tls(mut self, validate: bool) -> Self {
        self.validate_tls = validate;
        self
    }

    fn request(
        &self,
        target: &Target,
    ) -> Result<tungstenite::handshake::client::Request, TransportError> {
        let url = http_to_ws_scheme(target.as_str());
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidTarget(format!("{}: {}", target, e)))?;

        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidTarget(format!("invalid header name: {}", name)))?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                TransportError::InvalidTarget(format!("invalid header value for {}", name))
            })?;
            request.headers_mut().insert(header_name, header_value);
        }

        Ok(request)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Sink = WsSink;
    type Stream = WsSource;

    async fn connect(&self, target: &Target) -> Result<(WsSink, WsSource), TransportError> {
        let request = self.request(target)?;
        let tls = if request.uri().scheme_str() == Some("wss") {
            Some(TlsConnector::Rustls(tls::client_config(self.validate_tls)?))
        } else {
            None
        };

        let (ws_stream, response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, tls)
                .await
                .map_err(map_ws_error)?;
        tracing::debug!("websocket upgraded: HTTP {}", response.status());

        let (sink, stream) = ws_stream.split();
        Ok((WsSink { sink }, WsSource { stream }))
    }
}

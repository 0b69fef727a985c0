//! Opening console sessions

use std::sync::Arc;

use px_core::config::{BackoffConfig, RelayConfig};
use px_core::traits::{Connector, TerminalSizeSource, TransportSink};
use px_core::{RelayError, Target, TransportError};
use px_protocol::Credential;

use crate::handshake::handshake;
use crate::reconnect::ExponentialBackoff;
use crate::session::Session;

/// Opens console sessions through a [`Connector`]
pub struct ConsoleRelay<C> {
    connector: C,
    config: RelayConfig,
    sizes: Arc<dyn TerminalSizeSource>,
}

impl<C: Connector> ConsoleRelay<C> {
    /// Create a relay reporting the default 24x80 terminal size
    pub fn new(connector: C, config: RelayConfig) -> Self {
        Self {
            connector,
            config,
            sizes: Arc::new(px_core::traits::FixedSize::default()),
        }
    }

    /// Use `sizes` as the local terminal for new sessions
    pub fn with_size_source(mut self, sizes: Arc<dyn TerminalSizeSource>) -> Self {
        self.sizes = sizes;
        self
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open the tunnel, authenticate and start the session tasks.
    ///
    /// No task is started unless the handshake succeeds. A connection
    /// opened by a failed attempt is closed before returning.
    pub async fn open(&self, target: &Target, credential: &Credential) -> Result<Session, RelayError> {
        tracing::debug!("connecting to {}", target);
        let connect_timeout = self.config.connect_timeout;
        let (sink, stream) = tokio::time::timeout(connect_timeout, self.connector.connect(target))
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))
            .and_then(|connected| connected)
            .map_err(|source| RelayError::Connect {
                target: target.to_string(),
                source,
            })?;

        let mut sink: Box<dyn TransportSink> = Box::new(sink);
        let mut stream = Box::new(stream);

        let initial = match handshake(
            sink.as_mut(),
            stream.as_mut(),
            credential,
            &self.config.ack,
            self.sizes.as_ref(),
            connect_timeout,
        )
        .await
        {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("handshake with {} failed: {}", target, e);
                if let Err(close_err) = sink.close().await {
                    tracing::debug!("error closing rejected connection: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Session::start(
            target.clone(),
            sink,
            stream,
            Arc::clone(&self.sizes),
            initial,
            &self.config,
        ))
    }

    /// Open a session, retrying connection failures with backoff.
    ///
    /// Only [`RelayError::Connect`] is retried; authentication failures and
    /// anything else return immediately. Gives up after
    /// `backoff.max_attempts` attempts.
    pub async fn open_with_retry(
        &self,
        target: &Target,
        credential: &Credential,
        backoff: &BackoffConfig,
    ) -> Result<Session, RelayError> {
        let max_attempts = backoff.max_attempts.max(1);
        let mut delays = ExponentialBackoff::from_config(backoff);
        let mut attempt = 1;

        loop {
            match self.open(target, credential).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = delays.next_delay();
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        "Connection failed: {}. Retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryConnector, ScriptedSize, Written};
    use bytes::Bytes;
    use std::time::Duration;

    fn alice() -> Credential {
        Credential::new("alice", "tok123")
    }

    fn target() -> Target {
        Target::new("wss://pve.lan:8006/api2/json/nodes/pve1/vncwebsocket?port=5900&vncticket=secret")
    }

    #[tokio::test]
    async fn test_open_sends_credential_then_size() {
        let (connector, mut peer) = MemoryConnector::with_ack(b"OK");
        let relay = ConsoleRelay::new(connector, RelayConfig::default());

        let mut session = relay.open(&target(), &alice()).await.unwrap();
        session.send("ls\n").unwrap();
        session.close().await.unwrap();

        assert_eq!(
            peer.drain(),
            vec![
                Written::Message(Bytes::from_static(b"alice:tok123\n")),
                Written::Message(Bytes::from_static(b"1:24:80:")),
                Written::Message(Bytes::from_static(b"0:3:ls\n")),
                Written::Message(Bytes::from_static(b"0:1:\n")),
                Written::CloseFrame,
                Written::Released,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_size_not_resent() {
        let (connector, mut peer) = MemoryConnector::with_ack(b"OK");
        // Handshake reads the first entry, the watcher the rest
        let sizes = ScriptedSize::new([(24, 80), (24, 80), (24, 80), (30, 100)]);
        let relay =
            ConsoleRelay::new(connector, RelayConfig::default()).with_size_source(Arc::new(sizes));

        let mut session = relay.open(&target(), &alice()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5500)).await;
        session.close().await.unwrap();

        let resizes: Vec<_> = peer
            .drain()
            .into_iter()
            .filter(|w| matches!(w, Written::Message(m) if m.starts_with(b"1:")))
            .collect();
        assert_eq!(
            resizes,
            vec![
                Written::Message(Bytes::from_static(b"1:24:80:")),
                Written::Message(Bytes::from_static(b"1:30:100:")),
            ]
        );
    }

    #[tokio::test]
    async fn test_auth_failure_releases_connection() {
        let (connector, mut peer) = MemoryConnector::with_ack(b"DENIED");
        let relay = ConsoleRelay::new(connector, RelayConfig::default());

        let result = relay.open(&target(), &alice()).await;
        assert!(matches!(result, Err(RelayError::Auth { .. })));

        // Credential line, then the connection is released. No close frame
        // from a writer because no tasks were started.
        assert_eq!(
            peer.drain(),
            vec![
                Written::Message(Bytes::from_static(b"alice:tok123\n")),
                Written::Released,
            ]
        );
        assert_eq!(peer.written.recv().await, None);
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        let relay = ConsoleRelay::new(MemoryConnector::refusing(), RelayConfig::default());

        match relay.open(&target(), &alice()).await {
            Err(RelayError::Connect { target, .. }) => {
                assert!(!target.contains("secret"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let relay = ConsoleRelay::new(MemoryConnector::refusing(), RelayConfig::default());
        let backoff = BackoffConfig {
            max_attempts: 3,
            jitter: 0.0,
            ..BackoffConfig::default()
        };

        let started = tokio::time::Instant::now();
        let result = relay.open_with_retry(&target(), &alice(), &backoff).await;

        assert!(matches!(result, Err(RelayError::Connect { .. })));
        // 1s + 2s between the three attempts
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_not_retried() {
        let (connector, _peer) = MemoryConnector::with_ack(b"NO");
        let relay = ConsoleRelay::new(connector, RelayConfig::default());
        let backoff = BackoffConfig {
            max_attempts: 5,
            ..BackoffConfig::default()
        };

        let started = tokio::time::Instant::now();
        let result = relay.open_with_retry(&target(), &alice(), &backoff).await;

        assert!(matches!(result, Err(RelayError::Auth { .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

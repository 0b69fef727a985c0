//! Session handle returned to the caller

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use px_core::config::RelayConfig;
use px_core::traits::{TerminalSizeSource, TransportSink, TransportStream};
use px_core::{RelayError, Target};
use px_protocol::TerminalSize;

use crate::errors::{ErrorSink, ErrorStream};
use crate::mux::{run_reader, run_writer, WriterInputs};
use crate::watcher::DimensionWatcher;

/// Inbound messages buffered between the reader and the consumer.
///
/// When full the reader stops pulling from the wire; outbound traffic is
/// unaffected.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Size changes buffered between the watcher and the writer
const RESIZE_CHANNEL_CAPACITY: usize = 8;

/// Inbound terminal bytes, delivered exactly as they arrived.
///
/// Ends when the session's reader task exits.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<Bytes>,
}

impl Inbound {
    /// Receive the next inbound message, or `None` once the reader exited
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for Inbound {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct SessionTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<Box<dyn TransportSink>>,
    watcher: JoinHandle<()>,
}

/// One live console relay bound to a single tunnel connection.
///
/// Created by [`ConsoleRelay::open`](crate::ConsoleRelay::open) after a
/// successful handshake. Runs three tasks (reader, writer, dimension
/// watcher) until [`close`](Session::close) is called or the session is
/// dropped.
pub struct Session {
    target: Target,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: Option<Inbound>,
    errors: Option<ErrorStream>,
    dropped_errors: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
    tasks: Option<SessionTasks>,
}

impl Session {
    /// Spawn the session tasks around an authenticated connection
    pub(crate) fn start(
        target: Target,
        sink: Box<dyn TransportSink>,
        stream: Box<dyn TransportStream>,
        sizes: Arc<dyn TerminalSizeSource>,
        initial_size: TerminalSize,
        config: &RelayConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (error_sink, errors) = ErrorSink::new(config.error_capacity);
        let dropped_errors = error_sink.dropped_counter();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (resize_tx, resize_rx) = mpsc::channel(RESIZE_CHANNEL_CAPACITY);

        let watcher = DimensionWatcher::new(sizes, initial_size, config.resize_poll_interval)
            .spawn(resize_tx, shutdown.clone());
        let reader = tokio::spawn(run_reader(
            stream,
            inbound_tx,
            error_sink.clone(),
            shutdown.clone(),
        ));
        let writer = tokio::spawn(run_writer(
            sink,
            WriterInputs {
                outbound: outbound_rx,
                resizes: resize_rx,
                keepalive_interval: config.keepalive_interval,
            },
            error_sink,
            shutdown.clone(),
        ));

        tracing::info!("console session open: {}", target);

        Self {
            target,
            outbound: Some(outbound_tx),
            inbound: Some(Inbound { rx: inbound_rx }),
            errors: Some(errors),
            dropped_errors,
            shutdown,
            shutdown_timeout: config.shutdown_timeout,
            tasks: Some(SessionTasks {
                reader,
                writer,
                watcher,
            }),
        }
    }

    /// Target this session is connected to
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.tasks.is_none()
    }

    /// Submit terminal bytes to the writer without waiting
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), RelayError> {
        let outbound = self.outbound.as_ref().ok_or(RelayError::Closed)?;
        outbound.send(data.into()).map_err(|_| RelayError::Closed)
    }

    /// Take the inbound message sequence. Returns `None` if already taken.
    pub fn inbound(&mut self) -> Option<Inbound> {
        self.inbound.take()
    }

    /// Take the reported error sequence. Returns `None` if already taken.
    pub fn errors(&mut self) -> Option<ErrorStream> {
        self.errors.take()
    }

    /// Receive the next inbound message.
    ///
    /// Returns `None` when the reader has exited or the inbound sequence
    /// was taken with [`inbound`](Session::inbound).
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.as_mut()?.recv().await
    }

    /// Receive the next reported error.
    ///
    /// Returns `None` when all tasks have exited or the error sequence was
    /// taken with [`errors`](Session::errors).
    pub async fn next_error(&mut self) -> Option<RelayError> {
        self.errors.as_mut()?.recv().await
    }

    /// Errors discarded because nobody was reading the error sequence
    pub fn dropped_errors(&self) -> usize {
        self.dropped_errors.load(Ordering::Relaxed)
    }

    /// Shut the session down. Calling it again is a no-op.
    ///
    /// Fires the shutdown signal, waits (bounded by the configured shutdown
    /// timeout) for all three tasks to exit, then closes the connection.
    /// Tasks still running at the deadline are aborted and reported as
    /// [`RelayError::ShutdownTimeout`]; the connection is released either
    /// way.
    pub async fn close(&mut self) -> Result<(), RelayError> {
        let Some(tasks) = self.tasks.take() else {
            return Ok(());
        };
        tracing::info!("closing console session: {}", self.target);

        self.outbound = None;
        self.shutdown.cancel();

        let SessionTasks {
            mut reader,
            mut writer,
            mut watcher,
        } = tasks;
        let timeout = self.shutdown_timeout;

        let joined = tokio::time::timeout(timeout, async {
            let sink = (&mut writer).await;
            let _ = (&mut reader).await;
            let _ = (&mut watcher).await;
            sink
        })
        .await;

        match joined {
            Ok(Ok(mut sink)) => {
                if let Err(e) = sink.close().await {
                    tracing::debug!("error releasing connection: {}", e);
                }
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!("writer task failed: {}", e);
                Ok(())
            }
            Err(_) => {
                let pending = [
                    reader.is_finished(),
                    writer.is_finished(),
                    watcher.is_finished(),
                ]
                .iter()
                .filter(|finished| !**finished)
                .count();
                reader.abort();
                writer.abort();
                watcher.abort();
                tracing::warn!("{} session task(s) did not stop within {:?}", pending, timeout);
                Err(RelayError::ShutdownTimeout { pending, timeout })
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.tasks.is_some() {
            tracing::debug!("session dropped without close: {}", self.target);
            self.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_pair, Peer, ScriptedSize, StalledSink, Written};
    use px_core::traits::FixedSize;
    use tokio::time;

    fn start(sizes: Arc<dyn TerminalSizeSource>, initial: TerminalSize) -> (Session, Peer) {
        let (sink, stream, peer) = memory_pair();
        let session = Session::start(
            Target::new("mem://console"),
            Box::new(sink),
            Box::new(stream),
            sizes,
            initial,
            &RelayConfig::default(),
        );
        (session, peer)
    }

    #[tokio::test]
    async fn test_send_after_close_is_closed_error() {
        let (mut session, _peer) = start(Arc::new(FixedSize::default()), TerminalSize::default());

        session.send("ls\n").unwrap();
        session.close().await.unwrap();

        assert!(session.is_closed());
        assert!(matches!(session.send("ls\n"), Err(RelayError::Closed)));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (mut session, mut peer) =
            start(Arc::new(FixedSize::default()), TerminalSize::default());

        session.close().await.unwrap();
        session.close().await.unwrap();

        let written = peer.drain();
        assert_eq!(
            written
                .iter()
                .filter(|w| matches!(w, Written::CloseFrame))
                .count(),
            1
        );
        assert_eq!(written.last(), Some(&Written::Released));
    }

    #[tokio::test]
    async fn test_sequences_end_after_close() {
        let (mut session, peer) = start(Arc::new(FixedSize::default()), TerminalSize::default());
        let mut inbound = session.inbound().unwrap();
        let mut errors = session.errors().unwrap();
        assert!(session.inbound().is_none());

        peer.reply(b"hello");
        assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"hello")));

        session.close().await.unwrap();
        assert!(inbound.recv().await.is_none());
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_resize_for_size_change() {
        let sizes = ScriptedSize::new([(24, 80), (24, 80), (30, 100)]);
        let (mut session, mut peer) = start(Arc::new(sizes), TerminalSize::new(24, 80));

        time::sleep(Duration::from_millis(5500)).await;
        session.close().await.unwrap();

        let resizes: Vec<_> = peer
            .drain()
            .into_iter()
            .filter(|w| matches!(w, Written::Message(m) if m.starts_with(b"1:")))
            .collect();
        assert_eq!(
            resizes,
            vec![Written::Message(Bytes::from_static(b"1:30:100:"))]
        );
    }

    #[tokio::test]
    async fn test_read_failure_keeps_outbound_open() {
        let (mut session, mut peer) =
            start(Arc::new(FixedSize::default()), TerminalSize::default());

        peer.inbound
            .send(Err(px_core::TransportError::Io("reset".into())))
            .unwrap();
        assert!(matches!(
            session.next_error().await,
            Some(RelayError::Read(_))
        ));
        assert!(session.recv().await.is_none());

        session.send("still here").unwrap();
        assert_eq!(
            peer.written.recv().await,
            Some(Written::Message(Bytes::from_static(b"0:10:still here")))
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_without_close_stops_tasks() {
        let (session, mut peer) = start(Arc::new(FixedSize::default()), TerminalSize::default());
        drop(session);

        // Writer observes the cancelled token and sends its close frame
        assert_eq!(peer.written.recv().await, Some(Written::CloseFrame));
        assert_eq!(peer.written.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_writer_times_out_close() {
        let (_sink, stream, _peer) = memory_pair();
        let config = RelayConfig {
            shutdown_timeout: Duration::from_secs(1),
            ..RelayConfig::default()
        };
        let mut session = Session::start(
            Target::new("mem://console"),
            Box::new(StalledSink),
            Box::new(stream),
            Arc::new(FixedSize::default()),
            TerminalSize::default(),
            &config,
        );

        let result = session.close().await;
        assert!(matches!(
            result,
            Err(RelayError::ShutdownTimeout { pending: 1, timeout }) if timeout == Duration::from_secs(1)
        ));
        assert!(session.is_closed());

        // Stragglers were aborted, so the second close has nothing to do
        session.close().await.unwrap();
        assert!(session.next_error().await.is_none());
    }
}

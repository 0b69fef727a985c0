//! In-memory test doubles for the transport and size traits

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use px_core::traits::{Connector, TerminalSizeSource, TransportSink, TransportStream};
use px_core::{Target, TransportError};
use px_protocol::TerminalSize;

/// Size source replaying a script, then repeating its last entry
pub(crate) struct ScriptedSize {
    script: Mutex<VecDeque<TerminalSize>>,
    last: Mutex<TerminalSize>,
}

impl ScriptedSize {
    pub(crate) fn new(sizes: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            script: Mutex::new(
                sizes
                    .into_iter()
                    .map(|(rows, cols)| TerminalSize::new(rows, cols))
                    .collect(),
            ),
            last: Mutex::new(TerminalSize::default()),
        }
    }
}

impl TerminalSizeSource for ScriptedSize {
    fn current_size(&self) -> TerminalSize {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}

/// Something the relay did to the write half
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Written {
    Message(Bytes),
    CloseFrame,
    Released,
}

pub(crate) struct MemorySink {
    written: mpsc::UnboundedSender<Written>,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for MemorySink {
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".into()));
        }
        self.written
            .send(Written::Message(message))
            .map_err(|_| TransportError::LocallyClosed)
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.written
            .send(Written::CloseFrame)
            .map_err(|_| TransportError::LocallyClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.written.send(Written::Released);
        Ok(())
    }
}

/// Write half whose sends never complete
pub(crate) struct StalledSink;

#[async_trait]
impl TransportSink for StalledSink {
    async fn send(&mut self, _message: Bytes) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub(crate) struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl TransportStream for MemoryStream {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.inbound.recv().await
    }
}

/// The far end of an in-memory connection
pub(crate) struct Peer {
    pub(crate) written: mpsc::UnboundedReceiver<Written>,
    pub(crate) inbound: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
    pub(crate) fail_writes: Arc<AtomicBool>,
}

impl Peer {
    /// Everything written so far, without waiting
    pub(crate) fn drain(&mut self) -> Vec<Written> {
        let mut out = Vec::new();
        while let Ok(w) = self.written.try_recv() {
            out.push(w);
        }
        out
    }

    /// Queue a message for the relay to read
    pub(crate) fn reply(&self, message: &[u8]) {
        let _ = self.inbound.send(Ok(Bytes::copy_from_slice(message)));
    }
}

pub(crate) fn memory_pair() -> (MemorySink, MemoryStream, Peer) {
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    (
        MemorySink {
            written: written_tx,
            fail_writes: Arc::clone(&fail_writes),
        },
        MemoryStream {
            inbound: inbound_rx,
        },
        Peer {
            written: written_rx,
            inbound: inbound_tx,
            fail_writes,
        },
    )
}

/// Connector handing out one prepared in-memory connection
pub(crate) struct MemoryConnector {
    conn: Mutex<Option<(MemorySink, MemoryStream)>>,
}

impl MemoryConnector {
    /// Connector whose peer has already queued `ack`
    pub(crate) fn with_ack(ack: &[u8]) -> (Self, Peer) {
        let (sink, stream, peer) = memory_pair();
        peer.reply(ack);
        let connector = Self {
            conn: Mutex::new(Some((sink, stream))),
        };
        (connector, peer)
    }

    /// Connector that refuses every connection
    pub(crate) fn refusing() -> Self {
        Self {
            conn: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    async fn connect(&self, _target: &Target) -> Result<(MemorySink, MemoryStream), TransportError> {
        self.conn
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Io("connection refused".into()))
    }
}

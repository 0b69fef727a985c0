//! Bounded, non-blocking error reporting
//!
//! Background tasks report in-session failures through an [`ErrorSink`].
//! The queue is bounded and reporting never waits: when it is full the
//! newest error is dropped and counted, so a consumer that stops reading
//! errors can never stall the writer.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use px_core::RelayError;

/// Reporting half shared by the session's tasks
#[derive(Debug, Clone)]
pub(crate) struct ErrorSink {
    tx: mpsc::Sender<RelayError>,
    dropped: Arc<AtomicUsize>,
}

impl ErrorSink {
    /// Create a sink holding at most `capacity` unread errors
    pub(crate) fn new(capacity: usize) -> (Self, ErrorStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicUsize::new(0)),
        };
        (sink, ErrorStream { rx })
    }

    /// Queue an error without waiting
    pub(crate) fn report(&self, error: RelayError) {
        match self.tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "error queue full, dropping: {}", error);
            }
            Err(TrySendError::Closed(error)) => {
                tracing::debug!("error consumer gone, discarding: {}", error);
            }
        }
    }

    /// Shared counter of errors discarded because the queue was full
    pub(crate) fn dropped_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.dropped)
    }
}

/// Errors reported by a session's background tasks.
///
/// Ends once every task of the session has exited.
#[derive(Debug)]
pub struct ErrorStream {
    rx: mpsc::Receiver<RelayError>,
}

impl ErrorStream {
    /// Receive the next reported error, or `None` once the session's
    /// tasks have all exited
    pub async fn recv(&mut self) -> Option<RelayError> {
        self.rx.recv().await
    }
}

impl Stream for ErrorStream {
    type Item = RelayError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_and_receive() {
        let (sink, mut stream) = ErrorSink::new(4);
        sink.report(RelayError::Closed);
        drop(sink);

        assert!(matches!(stream.recv().await, Some(RelayError::Closed)));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (sink, mut stream) = ErrorSink::new(1);
        let dropped = sink.dropped_counter();

        sink.report(RelayError::Auth {
            reason: "first".into(),
        });
        sink.report(RelayError::Auth {
            reason: "second".into(),
        });
        sink.report(RelayError::Closed);
        drop(sink);

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        match stream.recv().await {
            Some(RelayError::Auth { reason }) => assert_eq!(reason, "first"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn test_report_after_consumer_dropped_is_silent() {
        let (sink, stream) = ErrorSink::new(1);
        drop(stream);
        sink.report(RelayError::Closed);
        assert_eq!(sink.dropped_counter().load(Ordering::Relaxed), 0);
    }
}

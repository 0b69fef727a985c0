//! Reader and writer tasks of a live session
//!
//! The reader only reads and the writer only writes, so a stalled inbound
//! stream never holds back keepalives or resizes. The writer is the single
//! owner of the write half and the only task that sends the close frame:
//! shutdown fires, the writer sends close and hands the write half back,
//! the reader stops quietly.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use px_core::traits::{TransportSink, TransportStream};
use px_core::{RelayError, TransportError};
use px_protocol::{Frame, TerminalSize, MAX_PAYLOAD_SIZE};

use crate::errors::ErrorSink;

/// Shortest timer period the tasks accept
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Read inbound messages and forward them untouched until the stream
/// fails, ends, or shutdown fires.
pub(crate) async fn run_reader(
    mut stream: Box<dyn TransportStream>,
    inbound: mpsc::Sender<Bytes>,
    errors: ErrorSink,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = stream.recv() => next,
        };

        match next {
            Some(Ok(message)) => {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    sent = inbound.send(message) => {
                        if sent.is_err() {
                            tracing::debug!("inbound consumer gone, discarding");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                if shutdown.is_cancelled() || e == TransportError::LocallyClosed {
                    tracing::debug!("reader stopped on local close");
                } else if e.is_benign_close() {
                    tracing::info!("console closed by peer: {}", e);
                } else {
                    errors.report(RelayError::Read(e));
                }
                break;
            }
            None => {
                tracing::debug!("inbound stream ended");
                break;
            }
        }
    }

    tracing::debug!("reader task exiting");
}

/// Everything the writer arbitrates between besides shutdown
pub(crate) struct WriterInputs {
    pub(crate) outbound: mpsc::UnboundedReceiver<Bytes>,
    pub(crate) resizes: mpsc::Receiver<TerminalSize>,
    pub(crate) keepalive_interval: Duration,
}

/// Write outbound data, resizes and keepalives until shutdown, then send
/// the close frame and return the write half.
pub(crate) async fn run_writer(
    mut sink: Box<dyn TransportSink>,
    inputs: WriterInputs,
    errors: ErrorSink,
    shutdown: CancellationToken,
) -> Box<dyn TransportSink> {
    let WriterInputs {
        mut outbound,
        mut resizes,
        keepalive_interval,
    } = inputs;

    let period = keepalive_interval.max(MIN_PERIOD);
    let mut keepalive = time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                // Data submitted before shutdown still goes out
                while let Ok(data) = outbound.try_recv() {
                    write_data(sink.as_mut(), data, &errors).await;
                }
                match sink.send_close().await {
                    Ok(()) => {}
                    // Peer already closed the connection
                    Err(TransportError::LocallyClosed) => {
                        tracing::debug!("connection already closing");
                    }
                    Err(source) => errors.report(RelayError::Write { frame: "close", source }),
                }
                break;
            }
            _ = keepalive.tick() => {
                tracing::debug!("sending keep alive");
                write_frame(sink.as_mut(), &Frame::Keepalive, &errors).await;
            }
            Some(size) = resizes.recv() => {
                tracing::debug!("resizing terminal window: {}", size);
                write_frame(sink.as_mut(), &Frame::Resize(size), &errors).await;
            }
            Some(data) = outbound.recv() => {
                tracing::trace!("sending {} bytes", data.len());
                write_data(sink.as_mut(), data, &errors).await;
            }
        }
    }

    tracing::debug!("writer task exiting");
    sink
}

/// Write `data` as one data frame per `MAX_PAYLOAD_SIZE` chunk so every
/// frame stays decodable.
async fn write_data(sink: &mut dyn TransportSink, data: Bytes, errors: &ErrorSink) {
    if data.len() <= MAX_PAYLOAD_SIZE {
        write_frame(sink, &Frame::Data(data), errors).await;
        return;
    }
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + MAX_PAYLOAD_SIZE).min(data.len());
        write_frame(sink, &Frame::Data(data.slice(offset..end)), errors).await;
        offset = end;
    }
}

/// Write every message of `frame` in order, reporting the first failure.
///
/// A failed write never ends the session.
async fn write_frame(sink: &mut dyn TransportSink, frame: &Frame, errors: &ErrorSink) {
    for message in frame.to_messages() {
        if let Err(source) = sink.send(message).await {
            errors.report(RelayError::Write {
                frame: frame.name(),
                source,
            });
            return;
        }
    }
}

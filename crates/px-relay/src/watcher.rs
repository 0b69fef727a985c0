//! Local terminal size polling
//!
//! The watcher owns the last size it observed and only ever talks to the
//! writer by sending immutable [`TerminalSize`] values. It does no I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use px_core::traits::TerminalSizeSource;
use px_protocol::TerminalSize;

/// Polls a [`TerminalSizeSource`] and emits a size whenever it changes
pub(crate) struct DimensionWatcher {
    source: Arc<dyn TerminalSizeSource>,
    last: TerminalSize,
    interval: Duration,
}

impl DimensionWatcher {
    /// Create a watcher that considers `initial` already reported
    pub(crate) fn new(
        source: Arc<dyn TerminalSizeSource>,
        initial: TerminalSize,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            last: initial,
            interval,
        }
    }

    /// Start polling until `shutdown` fires
    pub(crate) fn spawn(
        self,
        resizes: mpsc::Sender<TerminalSize>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(resizes, shutdown))
    }

    async fn run(mut self, resizes: mpsc::Sender<TerminalSize>, shutdown: CancellationToken) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(size) = self.poll() else {
                continue;
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = resizes.send(size) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("dimension watcher stopped");
    }

    /// Query the source once, returning the size if it changed
    fn poll(&mut self) -> Option<TerminalSize> {
        let current = self.source.current_size();
        if current == self.last {
            return None;
        }
        tracing::trace!("terminal size changed: {} -> {}", self.last, current);
        self.last = current;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSize;

    #[test]
    fn test_poll_reports_only_changes() {
        let source = ScriptedSize::new([(24, 80), (24, 80), (30, 100), (30, 100)]);
        let mut watcher =
            DimensionWatcher::new(Arc::new(source), TerminalSize::new(24, 80), Duration::ZERO);

        assert_eq!(watcher.poll(), None);
        assert_eq!(watcher.poll(), Some(TerminalSize::new(30, 100)));
        assert_eq!(watcher.poll(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_resize_per_transition() {
        let source = ScriptedSize::new([(24, 80), (30, 100)]);
        let watcher = DimensionWatcher::new(
            Arc::new(source),
            TerminalSize::new(24, 80),
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = watcher.spawn(tx, shutdown.clone());

        time::sleep(Duration::from_millis(5500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(rx.recv().await, Some(TerminalSize::new(30, 100)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let watcher = DimensionWatcher::new(
            Arc::new(TerminalSize::default),
            TerminalSize::default(),
            Duration::from_secs(1),
        );
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let handle = watcher.spawn(tx, shutdown.clone());

        shutdown.cancel();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }
}

//! Local terminal size query

use px_protocol::TerminalSize;

/// Reports the current size of the local terminal
pub trait TerminalSizeSource: Send + Sync {
    /// Current terminal dimensions
    fn current_size(&self) -> TerminalSize;
}

impl<F> TerminalSizeSource for F
where
    F: Fn() -> TerminalSize + Send + Sync,
{
    fn current_size(&self) -> TerminalSize {
        self()
    }
}

/// A size that never changes, for sessions without a local terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSize(pub TerminalSize);

impl TerminalSizeSource for FixedSize {
    fn current_size(&self) -> TerminalSize {
        self.0
    }
}

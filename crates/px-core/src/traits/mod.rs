//! Collaborator traits the relay is written against

mod size;
mod transport;

pub use size::{FixedSize, TerminalSizeSource};
pub use transport::{Connector, TransportSink, TransportStream};

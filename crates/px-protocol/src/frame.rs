//! Frame encoding
//!
//! Client messages are ASCII headers made of a one-character tag and
//! `:`-separated decimal fields:
//! - `0:<len>:<payload>` terminal data, always followed by a second
//!   message `0:1:\n`
//! - `1:<rows>:<cols>:` terminal size
//! - `2` keepalive
//!
//! Inbound bytes from the server are never framed; they are handed to
//! the consumer untouched.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::FrameCodec;
use crate::error::ProtocolError;
use crate::size::TerminalSize;

/// Second message written after every data frame.
///
/// This is itself a well-formed data frame carrying a single `\n`; the
/// remote line reader uses it to flush the preceding chunk.
pub const DATA_TERMINATOR: &[u8] = b"0:1:\n";

/// Maximum data payload accepted by the decoder (16MB - 1)
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Frame tag, the first byte of every client message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameTag {
    /// Terminal data
    Data = b'0',
    /// Terminal resize
    Resize = b'1',
    /// Keepalive ping
    Keepalive = b'2',
}

impl FrameTag {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'0' => Some(Self::Data),
            b'1' => Some(Self::Resize),
            b'2' => Some(Self::Keepalive),
            _ => None,
        }
    }
}

/// One structured client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal bytes
    Data(Bytes),
    /// New local terminal size
    Resize(TerminalSize),
    /// Liveness ping
    Keepalive,
}

impl Frame {
    /// Get the tag for this frame
    pub fn tag(&self) -> FrameTag {
        match self {
            Frame::Data(_) => FrameTag::Data,
            Frame::Resize(_) => FrameTag::Resize,
            Frame::Keepalive => FrameTag::Keepalive,
        }
    }

    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Data(_) => "data",
            Frame::Resize(_) => "resize",
            Frame::Keepalive => "keepalive",
        }
    }

    /// Encode the frame body (without the data terminator) into `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            Frame::Data(payload) => {
                let header = format!("0:{}:", payload.len());
                dst.reserve(header.len() + payload.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(payload);
            }
            Frame::Resize(size) => {
                dst.put_slice(format!("1:{}:{}:", size.rows, size.cols).as_bytes());
            }
            Frame::Keepalive => dst.put_u8(FrameTag::Keepalive.as_u8()),
        }
    }

    /// Encode into the wire messages to write, in order.
    ///
    /// Data frames produce two messages: the length-prefixed body and
    /// [`DATA_TERMINATOR`]. The protocol requires them to be separate writes.
    pub fn to_messages(&self) -> Vec<Bytes> {
        let mut body = BytesMut::new();
        self.encode_into(&mut body);
        match self {
            Frame::Data(_) => vec![body.freeze(), Bytes::from_static(DATA_TERMINATOR)],
            _ => vec![body.freeze()],
        }
    }

    /// Decode exactly one frame from a single message.
    ///
    /// The relay itself never decodes; this exists for servers and test
    /// doubles that need to read what a client wrote.
    pub fn decode(msg: &[u8]) -> Result<Frame, ProtocolError> {
        use tokio_util::codec::Decoder;

        let mut buf = BytesMut::from(msg);
        let frame = FrameCodec::new()
            .decode(&mut buf)?
            .ok_or(ProtocolError::Incomplete)?;
        if !buf.is_empty() {
            return Err(ProtocolError::TrailingBytes(buf.len()));
        }
        Ok(frame)
    }
}

/// Encode a data frame body: `0:<len>:<payload>`
///
/// Any length encodes, but [`Frame::decode`] only accepts payloads up to
/// [`MAX_PAYLOAD_SIZE`]; the session writer splits larger submissions into
/// several frames.
pub fn encode_data(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    Frame::Data(Bytes::copy_from_slice(payload)).encode_into(&mut buf);
    buf.freeze()
}

/// Encode a resize frame: `1:<rows>:<cols>:`
pub fn encode_resize(size: TerminalSize) -> Bytes {
    let mut buf = BytesMut::new();
    Frame::Resize(size).encode_into(&mut buf);
    buf.freeze()
}

/// Encode a keepalive frame: `2`
pub fn encode_keepalive() -> Bytes {
    Bytes::from_static(b"2")
}

//! Tokio codec for console frames on a byte stream
//!
//! WebSocket transports already delimit messages, so the relay writes
//! [`Frame::to_messages`] directly. This codec is for byte-stream peers
//! (the console proxy behind the websocket, or a test double) that see
//! the frames concatenated.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameTag, DATA_TERMINATOR, MAX_PAYLOAD_SIZE};
use crate::size::TerminalSize;

/// Longest decimal field accepted in a header
const MAX_FIELD_DIGITS: usize = 10;

/// Codec for encoding/decoding console frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of a data frame whose header was already consumed
    pending_payload: Option<usize>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_payload: None,
        }
    }
}

/// Parse `<tag>:<field>:<field>:...` from the front of `src`.
///
/// Returns the field values and the header length, or None if more bytes
/// are needed. Nothing is consumed.
fn parse_header(
    src: &[u8],
    fields: &[&'static str],
) -> Result<Option<(Vec<u64>, usize)>, ProtocolError> {
    let mut pos = 1;
    match src.get(pos) {
        None => return Ok(None),
        Some(b':') => pos += 1,
        Some(_) => return Err(ProtocolError::InvalidField { field: "separator" }),
    }

    let mut values = Vec::with_capacity(fields.len());
    for &field in fields {
        let start = pos;
        loop {
            match src.get(pos) {
                None => return Ok(None),
                Some(b':') => break,
                Some(b) if b.is_ascii_digit() && pos - start < MAX_FIELD_DIGITS => pos += 1,
                Some(_) => return Err(ProtocolError::InvalidField { field }),
            }
        }
        if pos == start {
            return Err(ProtocolError::InvalidField { field });
        }
        // Only ASCII digits were accepted above
        let value = src[start..pos]
            .iter()
            .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'));
        values.push(value);
        pos += 1;
    }

    Ok(Some((values, pos)))
}

fn dimension(value: u64, field: &'static str) -> Result<u16, ProtocolError> {
    u16::try_from(value).map_err(|_| ProtocolError::InvalidField { field })
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(len) = self.pending_payload {
            if src.len() < len {
                src.reserve(len - src.len());
                return Ok(None);
            }
            self.pending_payload = None;
            return Ok(Some(Frame::Data(src.split_to(len).freeze())));
        }

        let Some(&tag_byte) = src.first() else {
            return Ok(None);
        };
        let tag = FrameTag::from_u8(tag_byte).ok_or(ProtocolError::UnknownTag(tag_byte))?;

        match tag {
            FrameTag::Keepalive => {
                src.advance(1);
                Ok(Some(Frame::Keepalive))
            }
            FrameTag::Resize => {
                let Some((values, header_len)) = parse_header(src, &["rows", "cols"])? else {
                    return Ok(None);
                };
                let size = TerminalSize::new(
                    dimension(values[0], "rows")?,
                    dimension(values[1], "cols")?,
                );
                src.advance(header_len);
                Ok(Some(Frame::Resize(size)))
            }
            FrameTag::Data => {
                let Some((values, header_len)) = parse_header(src, &["length"])? else {
                    return Ok(None);
                };
                let len = usize::try_from(values[0])
                    .map_err(|_| ProtocolError::InvalidField { field: "length" })?;
                if len > MAX_PAYLOAD_SIZE {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: len,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                src.advance(header_len);
                self.pending_payload = Some(len);
                self.decode(src)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if let Frame::Data(payload) = &frame {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(ProtocolError::PayloadTooLarge {
                    size: payload.len(),
                    max: MAX_PAYLOAD_SIZE,
                });
            }
        }

        frame.encode_into(dst);
        if matches!(frame, Frame::Data(_)) {
            dst.extend_from_slice(DATA_TERMINATOR);
        }

        Ok(())
    }
}

//! Length-prefixed framing for byte-stream transports.
//!
//! On a stream socket every envelope is preceded by a length prefix of
//! 1, 2 or 4 bytes that counts the envelope bytes only:
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ Length     │ Envelope (context, id, body) │
//! │ 1|2|4 bytes│ `length` bytes               │
//! └────────────┴──────────────────────────────┘
//! ```
//!
//! Uses `bytes::BytesMut` for buffer management and a two-state machine
//! for fragmented reads:
//! - `WaitingForLength`: need the full prefix
//! - `WaitingForBody`: prefix parsed, need N more bytes
//!
//! # Example
//!
//! ```
//! use gatewire::protocol::{ByteOrder, FrameBuffer, LengthPrefix, PrefixWidth};
//!
//! let prefix = LengthPrefix::new(PrefixWidth::Two, ByteOrder::Big, 4096);
//! let mut buffer = FrameBuffer::new(prefix);
//!
//! let frames = buffer.push(&[0, 3, b'a', b'b', b'c', 0]).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], b"abc");
//! assert_eq!(buffer.len(), 1); // half of the next prefix
//! ```

use std::fmt;

use bytes::{Bytes, BytesMut};

use super::wire_format::ByteOrder;
use crate::error::{GatewayError, Result};

/// Smallest accepted frame body.
pub const MIN_FRAME_LEN: u32 = 1;

/// Default maximum frame body.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 4096;

/// Width of the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    One,
    Two,
    Four,
}

impl PrefixWidth {
    /// Number of prefix bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            PrefixWidth::One => 1,
            PrefixWidth::Two => 2,
            PrefixWidth::Four => 4,
        }
    }

    /// Largest body length the prefix can express.
    #[inline]
    pub fn max_len(self) -> u32 {
        match self {
            PrefixWidth::One => u8::MAX as u32,
            PrefixWidth::Two => u16::MAX as u32,
            PrefixWidth::Four => u32::MAX,
        }
    }
}

impl TryFrom<u8> for PrefixWidth {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PrefixWidth::One),
            2 => Ok(PrefixWidth::Two),
            4 => Ok(PrefixWidth::Four),
            other => Err(GatewayError::Config(format!(
                "length prefix must be 1, 2 or 4 bytes, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PrefixWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes())
    }
}

/// Length prefix settings for one stream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    width: PrefixWidth,
    order: ByteOrder,
    min_len: u32,
    max_len: u32,
}

impl LengthPrefix {
    /// Create prefix settings.
    ///
    /// `max_len` is clamped to what `width` can express.
    pub fn new(width: PrefixWidth, order: ByteOrder, max_len: u32) -> Self {
        Self {
            width,
            order,
            min_len: MIN_FRAME_LEN,
            max_len: max_len.min(width.max_len()),
        }
    }

    #[inline]
    pub fn width(&self) -> PrefixWidth {
        self.width
    }

    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    #[inline]
    pub fn max_len(&self) -> u32 {
        self.max_len
    }

    /// Check a body length against the configured bounds.
    pub fn check(&self, len: usize) -> Result<()> {
        if len > self.max_len as usize {
            return Err(GatewayError::Protocol(format!(
                "message too long: {} bytes, maximum {}",
                len, self.max_len
            )));
        }
        if len < self.min_len as usize {
            return Err(GatewayError::Protocol(format!(
                "message too short: {} bytes, minimum {}",
                len, self.min_len
            )));
        }
        Ok(())
    }

    /// Encode a body length.
    ///
    /// Returns a 4-byte buffer of which the first `width` bytes are valid.
    pub fn encode(&self, len: usize) -> Result<[u8; 4]> {
        self.check(len)?;
        let mut buf = [0u8; 4];
        match self.width {
            PrefixWidth::One => buf[0] = len as u8,
            PrefixWidth::Two => buf[..2].copy_from_slice(&self.order.u16_to_bytes(len as u16)),
            PrefixWidth::Four => buf.copy_from_slice(&self.order.u32_to_bytes(len as u32)),
        }
        Ok(buf)
    }

    /// Decode a prefix. `buf` must hold at least `width` bytes.
    fn decode(&self, buf: &[u8]) -> u32 {
        match self.width {
            PrefixWidth::One => buf[0] as u32,
            PrefixWidth::Two => self.order.u16_from_bytes([buf[0], buf[1]]) as u32,
            PrefixWidth::Four => self.order.u32_from_bytes([buf[0], buf[1], buf[2], buf[3]]),
        }
    }
}

impl Default for LengthPrefix {
    fn default() -> Self {
        Self::new(PrefixWidth::Two, ByteOrder::Big, DEFAULT_MAX_FRAME_LEN)
    }
}

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for body bytes.
    WaitingForBody { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    prefix: LengthPrefix,
}

impl FrameBuffer {
    /// Create a new frame buffer for the given prefix settings.
    pub fn new(prefix: LengthPrefix) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForLength,
            prefix,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a prefix announces a length outside
    /// the configured bounds. The buffer is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let width = self.prefix.width().bytes();
                    if self.buffer.len() < width {
                        return Ok(None);
                    }

                    let len = self.prefix.decode(&self.buffer[..width]);
                    self.prefix.check(len as usize)?;

                    let _ = self.buffer.split_to(width);
                    self.state = State::WaitingForBody {
                        remaining: len as usize,
                    };
                }
                State::WaitingForBody { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the buffer sits between frames with nothing pending.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForLength)
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(LengthPrefix::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(prefix: &LengthPrefix, body: &[u8]) -> Vec<u8> {
        let len = prefix.encode(body.len()).unwrap();
        let mut bytes = len[..prefix.width().bytes()].to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_single_complete_frame() {
        let prefix = LengthPrefix::default();
        let mut buffer = FrameBuffer::new(prefix);

        let frames = buffer.push(&framed(&prefix, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let prefix = LengthPrefix::default();
        let mut buffer = FrameBuffer::new(prefix);

        let mut combined = framed(&prefix, b"first");
        combined.extend(framed(&prefix, b"second"));
        combined.extend(framed(&prefix, b"third"));

        let frames = buffer.push(&combined).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[2][..], b"third");
    }

    #[test]
    fn test_fragmented_prefix_and_body() {
        let prefix = LengthPrefix::new(PrefixWidth::Four, ByteOrder::Little, 1024);
        let mut buffer = FrameBuffer::new(prefix);
        let bytes = framed(&prefix, b"fragmented body");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForLength");

        assert!(buffer.push(&bytes[2..7]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let frames = buffer.push(&bytes[7..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"fragmented body");
        assert_eq!(buffer.state_name(), "WaitingForLength");
    }

    #[test]
    fn test_byte_at_a_time() {
        let prefix = LengthPrefix::new(PrefixWidth::One, ByteOrder::Big, 255);
        let mut buffer = FrameBuffer::new(prefix);

        let mut all = Vec::new();
        for byte in framed(&prefix, b"hi there") {
            all.extend(buffer.push(&[byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], b"hi there");
    }

    #[test]
    fn test_prefix_byte_order() {
        let be = LengthPrefix::new(PrefixWidth::Two, ByteOrder::Big, 4096);
        let le = LengthPrefix::new(PrefixWidth::Two, ByteOrder::Little, 4096);

        assert_eq!(&be.encode(0x0102).unwrap()[..2], &[0x01, 0x02]);
        assert_eq!(&le.encode(0x0102).unwrap()[..2], &[0x02, 0x01]);
    }

    #[test]
    fn test_too_long_rejected() {
        let prefix = LengthPrefix::new(PrefixWidth::Two, ByteOrder::Big, 16);
        let mut buffer = FrameBuffer::new(prefix);

        let err = buffer.push(&[0, 17]).unwrap_err();
        assert!(err.to_string().contains("message too long"));
        assert!(prefix.encode(17).is_err());
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut buffer = FrameBuffer::default();
        let err = buffer.push(&[0, 0]).unwrap_err();
        assert!(err.to_string().contains("message too short"));
    }

    #[test]
    fn test_max_len_clamped_to_width() {
        let prefix = LengthPrefix::new(PrefixWidth::One, ByteOrder::Big, 100_000);
        assert_eq!(prefix.max_len(), 255);
        let prefix = LengthPrefix::new(PrefixWidth::Four, ByteOrder::Big, 100_000);
        assert_eq!(prefix.max_len(), 100_000);
    }

    #[test]
    fn test_prefix_width_from_u8() {
        assert_eq!(PrefixWidth::try_from(1).unwrap(), PrefixWidth::One);
        assert_eq!(PrefixWidth::try_from(2).unwrap(), PrefixWidth::Two);
        assert_eq!(PrefixWidth::try_from(4).unwrap(), PrefixWidth::Four);
        assert!(PrefixWidth::try_from(3).is_err());
    }

    #[test]
    fn test_clear_resets_state() {
        let prefix = LengthPrefix::default();
        let mut buffer = FrameBuffer::new(prefix);
        buffer.push(&framed(&prefix, b"abcdef")[..4]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForBody");

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForLength");
        assert!(buffer.is_empty());
    }
}

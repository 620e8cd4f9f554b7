//! Envelope header encoding and decoding.
//!
//! Every message travels inside an envelope with an 8-byte header:
//! ```text
//! ┌──────────┬──────────┬─────────────────────┐
//! │ Context  │ Msg ID   │ Payload             │
//! │ 4 bytes  │ 4 bytes  │ shape-specific      │
//! │ uint32   │ uint32   │                     │
//! └──────────┴──────────┴─────────────────────┘
//! ```
//!
//! Both integers use the byte order configured on the processor.
//! Context `0` is reserved for messages that expect no reply.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Envelope header size in bytes (fixed, exactly 8).
pub const ENVELOPE_HEADER_SIZE: usize = 8;

/// Context value meaning "no reply expected".
pub const NO_REPLY_CONTEXT: u32 = 0;

/// Whether a request sent under `context` expects a reply.
#[inline]
pub const fn expects_reply(context: u32) -> bool {
    context != NO_REPLY_CONTEXT
}

/// Byte order for multi-byte integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    /// Pick the order from a "little endian?" switch.
    pub fn from_little_endian(little: bool) -> Self {
        if little {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    #[inline]
    pub fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    #[inline]
    pub fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }

    #[inline]
    pub fn u16_to_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    #[inline]
    pub fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Client-assigned correlation number (0 = no reply expected).
    pub context: u32,
    /// Registered wire id of the payload's message shape.
    pub id: u32,
}

impl EnvelopeHeader {
    pub fn new(context: u32, id: u32) -> Self {
        Self { context, id }
    }

    /// Encode the header in the given byte order.
    ///
    /// # Example
    ///
    /// ```
    /// use gatewire::protocol::{ByteOrder, EnvelopeHeader};
    ///
    /// let bytes = EnvelopeHeader::new(7, 1).encode(ByteOrder::Big);
    /// assert_eq!(bytes, [0, 0, 0, 7, 0, 0, 0, 1]);
    /// ```
    pub fn encode(&self, order: ByteOrder) -> [u8; ENVELOPE_HEADER_SIZE] {
        let mut buf = [0u8; ENVELOPE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&order.u32_to_bytes(self.context));
        buf[4..8].copy_from_slice(&order.u32_to_bytes(self.id));
        buf
    }

    /// Decode the header from the start of an envelope.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if fewer than 8 bytes are available.
    pub fn decode(buf: &[u8], order: ByteOrder) -> Result<Self> {
        if buf.len() < ENVELOPE_HEADER_SIZE {
            return Err(GatewayError::Protocol(format!(
                "envelope too short: {} bytes, need {}",
                buf.len(),
                ENVELOPE_HEADER_SIZE
            )));
        }
        Ok(Self {
            context: order.u32_from_bytes([buf[0], buf[1], buf[2], buf[3]]),
            id: order.u32_from_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_layout() {
        let bytes = EnvelopeHeader::new(0x01020304, 0x05060708).encode(ByteOrder::Big);
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn test_header_little_endian_layout() {
        let bytes = EnvelopeHeader::new(0x01020304, 0x05060708).encode(ByteOrder::Little);
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05]);
    }

    #[test]
    fn test_header_respects_order_on_decode() {
        let header = EnvelopeHeader::new(99, 12);
        let le = header.encode(ByteOrder::Little);

        let same = EnvelopeHeader::decode(&le, ByteOrder::Little).unwrap();
        let swapped = EnvelopeHeader::decode(&le, ByteOrder::Big).unwrap();
        assert_eq!(same, header);
        assert_ne!(swapped, header);
    }

    #[test]
    fn test_decode_ignores_trailing_payload() {
        let mut buf = EnvelopeHeader::new(1, 2).encode(ByteOrder::Big).to_vec();
        buf.extend_from_slice(b"payload");
        let header = EnvelopeHeader::decode(&buf, ByteOrder::Big).unwrap();
        assert_eq!(header, EnvelopeHeader::new(1, 2));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let err = EnvelopeHeader::decode(&[0u8; 7], ByteOrder::Big).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_expects_reply() {
        assert!(!expects_reply(NO_REPLY_CONTEXT));
        assert!(expects_reply(1));
        assert!(expects_reply(u32::MAX));
    }

    #[test]
    fn test_byte_order_from_switch() {
        assert_eq!(ByteOrder::from_little_endian(true), ByteOrder::Little);
        assert_eq!(ByteOrder::from_little_endian(false), ByteOrder::Big);
        assert_eq!(ByteOrder::default(), ByteOrder::Big);
    }

    #[test]
    fn test_u16_helpers() {
        assert_eq!(ByteOrder::Big.u16_to_bytes(0x0102), [1, 2]);
        assert_eq!(ByteOrder::Little.u16_to_bytes(0x0102), [2, 1]);
        assert_eq!(ByteOrder::Little.u16_from_bytes([2, 1]), 0x0102);
    }
}

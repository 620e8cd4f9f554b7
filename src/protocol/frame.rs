//! Encoded envelopes ready for the wire.
//!
//! An [`EnvelopeParts`] keeps the three segments of one envelope apart
//! (context, id, payload) so transports can hand them to vectored I/O
//! without concatenating.
//!
//! # Example
//!
//! ```
//! use gatewire::protocol::{ByteOrder, EnvelopeParts};
//! use bytes::Bytes;
//!
//! let parts = EnvelopeParts::new(7, 2, Bytes::from_static(b"pong"), ByteOrder::Big);
//! assert_eq!(parts.len(), 8 + 4);
//! assert_eq!(&parts.to_vec()[..4], &[0, 0, 0, 7]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{ByteOrder, EnvelopeHeader, ENVELOPE_HEADER_SIZE};

/// One envelope split into its three write segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeParts {
    /// Encoded context (4 bytes).
    pub context: [u8; 4],
    /// Encoded wire id (4 bytes).
    pub id: [u8; 4],
    /// Serialized payload.
    pub payload: Bytes,
}

impl EnvelopeParts {
    /// Encode the header fields in `order` and attach the payload.
    pub fn new(context: u32, id: u32, payload: Bytes, order: ByteOrder) -> Self {
        Self {
            context: order.u32_to_bytes(context),
            id: order.u32_to_bytes(id),
            payload,
        }
    }

    /// The three segments in wire order.
    #[inline]
    pub fn segments(&self) -> [&[u8]; 3] {
        [&self.context, &self.id, &self.payload]
    }

    /// Total envelope size (header + payload).
    #[inline]
    pub fn len(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.payload.len()
    }

    /// Never true; an envelope always has its 8-byte header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Concatenate into one contiguous buffer.
    ///
    /// For message-oriented transports that need a single buffer per
    /// message. Stream transports should write [`segments`](Self::segments).
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_slice(&self.context);
        buf.put_slice(&self.id);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode the header segments back into numbers.
    pub fn header(&self, order: ByteOrder) -> EnvelopeHeader {
        EnvelopeHeader::new(
            order.u32_from_bytes(self.context),
            order.u32_from_bytes(self.id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_keep_segments_apart() {
        let parts = EnvelopeParts::new(1, 2, Bytes::from_static(b"abc"), ByteOrder::Big);
        let [ctx, id, payload] = parts.segments();

        assert_eq!(ctx, &[0, 0, 0, 1]);
        assert_eq!(id, &[0, 0, 0, 2]);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn test_to_vec_matches_segments() {
        let parts = EnvelopeParts::new(0xAABBCCDD, 5, Bytes::from_static(b"xy"), ByteOrder::Little);
        let flat = parts.to_vec();

        assert_eq!(flat.len(), parts.len());
        assert_eq!(&flat[..4], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&flat[4..8], &[5, 0, 0, 0]);
        assert_eq!(&flat[8..], b"xy");
    }

    #[test]
    fn test_empty_payload() {
        let parts = EnvelopeParts::new(3, 4, Bytes::new(), ByteOrder::Big);
        assert_eq!(parts.len(), ENVELOPE_HEADER_SIZE);
        assert!(!parts.is_empty());
    }

    #[test]
    fn test_header_roundtrip() {
        let header = EnvelopeHeader::new(77, 1234);
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let parts = EnvelopeParts::new(header.context, header.id, Bytes::new(), order);
            assert_eq!(parts.header(order), header);
        }
    }
}

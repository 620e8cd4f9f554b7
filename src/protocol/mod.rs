//! Protocol module - envelope format and stream framing.
//!
//! - 8-byte envelope header (context, message id) in a configurable byte order
//! - Envelope parts kept apart for vectored writes
//! - Length-prefixed frame buffer for byte-stream transports

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::EnvelopeParts;
pub use frame_buffer::{
    FrameBuffer, LengthPrefix, PrefixWidth, DEFAULT_MAX_FRAME_LEN, MIN_FRAME_LEN,
};
pub use wire_format::{
    expects_reply, ByteOrder, EnvelopeHeader, ENVELOPE_HEADER_SIZE, NO_REPLY_CONTEXT,
};

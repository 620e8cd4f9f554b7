//! Codec module - payload serialization.
//!
//! The envelope framing (context, id) lives in [`crate::protocol`]; this
//! module only turns message shapes into payload bytes and back.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (named struct fields)
//!
//! # Example
//!
//! ```
//! use gatewire::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;

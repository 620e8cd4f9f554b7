//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written with `to_vec_named` (struct-as-map), so a
//! client can add or reorder fields without breaking older peers, and
//! clients written in other languages decode by field name.
//!
//! # Example
//!
//! ```
//! use gatewire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Move {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let msg = Move { x: 3, y: -4 };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Move = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for message payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Login {
        account: String,
        token: u64,
        remember: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Login {
            account: "hero".to_string(),
            token: 0xDEAD_BEEF,
            remember: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Login = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_is_written_as_map() {
        let login = Login {
            account: "a".to_string(),
            token: 1,
            remember: false,
        };

        let encoded = MsgPackCodec::encode(&login).unwrap();

        // 0x83 = fixmap with 3 entries (an array would be 0x93)
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_unit_struct_and_empty_struct() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Ping {}

        let encoded = MsgPackCodec::encode(&Ping {}).unwrap();
        let decoded: Ping = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, Ping {});
    }

    #[test]
    fn test_enum_payload() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        enum Action {
            Attack { target: u32 },
            Flee,
        }

        for action in [Action::Attack { target: 9 }, Action::Flee] {
            let encoded = MsgPackCodec::encode(&action).unwrap();
            let decoded: Action = MsgPackCodec::decode(&encoded).unwrap();
            assert_eq!(decoded, action);
        }
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let invalid = b"\xc1 never valid msgpack";
        let result: Result<Login> = MsgPackCodec::decode(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_error_on_truncated_payload() {
        let login = Login {
            account: "truncated".to_string(),
            token: 7,
            remember: true,
        };
        let encoded = MsgPackCodec::encode(&login).unwrap();

        let result: Result<Login> = MsgPackCodec::decode(&encoded[..encoded.len() - 3]);
        assert!(result.is_err());
    }
}

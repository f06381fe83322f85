//! Serialization layer: turns arbitrary in-memory keys/values into the raw
//! byte strings the engine actually stores, and back.
//!
//! The engine itself never sees a `K` or `V` — only bytes. This module is
//! what lets `SaveState<K, V>` look like a normal Rust collection.

use serde::de::DeserializeOwned;
use serde::Serialize;

use savestate_core::{SaveStateError, SaveStateResult};

/// Encodes/decodes a single type `T` to and from byte strings.
pub trait ByteCodec<T> {
    fn encode(&self, value: &T) -> SaveStateResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> SaveStateResult<T>;
}

/// Default codec: `bincode`'s compact binary encoding, for any `T` that
/// derives `Serialize`/`DeserializeOwned`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bincode;

impl<T> ByteCodec<T> for Bincode
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> SaveStateResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| SaveStateError::InvalidArgument {
            message: format!("failed to encode value: {}", e),
        })
    }

    fn decode(&self, bytes: &[u8]) -> SaveStateResult<T> {
        bincode::deserialize(bytes).map_err(|e| SaveStateError::InvalidArgument {
            message: format!("failed to decode value: {}", e),
        })
    }
}

/// "dbm mode": bytes pass straight through with no framing at all. Faster
/// than [`Bincode`], but only usable with raw `Vec<u8>` keys/values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ByteCodec<Vec<u8>> for Identity {
    fn encode(&self, value: &Vec<u8>) -> SaveStateResult<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> SaveStateResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_bincode_roundtrip() {
        let codec = Bincode;
        let p = Point { x: 3, y: -7 };
        let bytes = codec.encode(&p).unwrap();
        let back: Point = codec.decode(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_identity_passthrough() {
        let codec = Identity;
        let v = vec![1u8, 2, 3];
        let bytes = codec.encode(&v).unwrap();
        assert_eq!(bytes, v);
        let back: Vec<u8> = codec.decode(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_bincode_decode_error_surfaces() {
        let codec = Bincode;
        let err = ByteCodec::<Point>::decode(&codec, &[0xFF]).unwrap_err();
        assert!(matches!(err, SaveStateError::InvalidArgument { .. }));
    }
}

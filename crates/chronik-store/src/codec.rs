//! The codec boundary: typed values in, opaque bytes out.
//!
//! The store persists payloads, metadata, and snapshot state as byte blobs
//! and never interprets them. This module is the caller's side of that
//! boundary: a [`Codec`] turns domain values into the bytes handed to the
//! store and back. Failures surface as [`StoreError::Serialization`],
//! distinct from storage faults, so a decode error reads as a data/schema
//! bug rather than an infrastructure one.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Encoding of event payloads, metadata, and snapshot state.
///
/// The store never invokes a codec itself; callers encode before
/// appending and decode after reading. Any format can implement this --
/// the stored bytes are opaque.
pub trait Codec: Send + Sync {
    /// Encode a value to bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError>;

    /// Decode a value from bytes.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError>;
}

/// JSON codec backed by [`serde_json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Deposited {
        amount: u32,
    }

    #[test]
    fn json_codec_roundtrips() {
        let codec = JsonCodec;
        let bytes = codec.encode(&Deposited { amount: 50 }).expect("encode");
        let back: Deposited = codec.decode(&bytes).expect("decode");
        assert_eq!(back, Deposited { amount: 50 });
    }

    #[test]
    fn decode_failure_is_a_serialization_error() {
        let codec = JsonCodec;
        let err = codec.decode::<Deposited>(b"not json").expect_err("must fail");
        assert!(matches!(err, StoreError::Serialization(_)));
        assert!(!err.is_transient());
    }
}

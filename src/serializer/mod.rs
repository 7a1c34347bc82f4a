//! Pluggable payload encoding.
//!
//! A [`Serializer`] turns any `serde` value into bytes and hands a
//! type-erased deserializer back for decoding. Values are never routed
//! through an intermediate data model, so binary formats that are not
//! self-describing work as well as JSON. The trait is object safe so a
//! server can swap encodings at configuration time without touching
//! connection logic. Typed values go through [`encode`] and [`decode`].
//!
//! # Custom serializer implementation
//!
//! ```
//! use wsnet::serializer::{DeserializeFn, Serializer};
//! use wsnet::{Error, Result};
//!
//! struct Pretty;
//!
//! impl Serializer for Pretty {
//!     fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
//!         serde_json::to_vec_pretty(value).map_err(|e| Error::encoding(e.to_string()))
//!     }
//!
//!     fn unmarshal<'de>(&self, data: &'de [u8], visit: &mut DeserializeFn<'_, 'de>) -> Result<()> {
//!         let mut de = serde_json::Deserializer::from_slice(data);
//!         visit(&mut <dyn erased_serde::Deserializer>::erase(&mut de))
//!             .map_err(|e| Error::decoding(e.to_string()))
//!     }
//! }
//!
//! let bytes = wsnet::encode(&Pretty, &[1, 2]).unwrap();
//! assert_eq!(wsnet::decode::<Vec<u8>>(&Pretty, &bytes).unwrap(), vec![1, 2]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

mod finite;
mod json;

pub use json::JsonSerializer;

// ============================================================================
// Serializer
// ============================================================================

/// Callback handed a deserializer positioned at the start of a payload.
pub type DeserializeFn<'a, 'de> =
    dyn FnMut(&mut dyn erased_serde::Deserializer<'de>) -> StdResult<(), erased_serde::Error> + 'a;

/// Marshal/unmarshal strategy for connection payloads.
pub trait Serializer: Send + Sync + 'static {
    /// Encodes a value into bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Encoding`] if the value has no representation in this format.
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>>;

    /// Runs `visit` over a deserializer reading `data`.
    ///
    /// # Errors
    ///
    /// [`Error::Decoding`] if the input is malformed or `visit` fails.
    fn unmarshal<'de>(&self, data: &'de [u8], visit: &mut DeserializeFn<'_, 'de>) -> Result<()>;
}

// ============================================================================
// Typed Helpers
// ============================================================================

/// Encodes any serializable value with `serializer`.
///
/// # Errors
///
/// [`Error::Encoding`] if `serializer` cannot represent the value (for
/// example a JSON map with non-string keys, or a non-finite float).
pub fn encode<T>(serializer: &dyn Serializer, value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serializer.marshal(&Erased(value))
}

/// Decodes a payload into `T` with `serializer`.
///
/// # Errors
///
/// [`Error::Decoding`] on malformed input or a shape mismatch.
pub fn decode<T>(serializer: &dyn Serializer, data: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut decoded = None;
    serializer.unmarshal(data, &mut |de| {
        decoded = Some(erased_serde::deserialize::<T>(de)?);
        Ok(())
    })?;
    decoded.ok_or_else(|| Error::decoding("serializer produced no value"))
}

/// Sized view of a possibly unsized value, so it can be erased.
struct Erased<'a, T: ?Sized>(&'a T);

impl<T> Serialize for Erased<'_, T>
where
    T: Serialize + ?Sized,
{
    fn serialize<S>(&self, serializer: S) -> StdResult<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use bincode::Options as _;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ChatMessage {
        room: String,
        author: String,
        body: String,
        tags: Vec<String>,
        seq: u64,
        edited: Option<bool>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Chunk {
        seq: u32,
        payload: Vec<u8>,
    }

    fn sample() -> ChatMessage {
        ChatMessage {
            room: "lobby".into(),
            author: "ünïcødé".into(),
            body: "hello \"world\"\n".into(),
            tags: vec!["a".into(), "b".into()],
            seq: 42,
            edited: None,
        }
    }

    /// Compact binary encoding; not self-describing.
    struct BincodeSerializer;

    impl Serializer for BincodeSerializer {
        fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
            bincode::DefaultOptions::new()
                .serialize(value)
                .map_err(|e| Error::encoding(e.to_string()))
        }

        fn unmarshal<'de>(
            &self,
            data: &'de [u8],
            visit: &mut DeserializeFn<'_, 'de>,
        ) -> Result<()> {
            let mut de = bincode::Deserializer::from_slice(data, bincode::DefaultOptions::new());
            visit(&mut <dyn erased_serde::Deserializer>::erase(&mut de))
                .map_err(|e| Error::decoding(e.to_string()))
        }
    }

    /// Accepts anything and never hands out a deserializer.
    struct Silent;

    impl Serializer for Silent {
        fn marshal(&self, _: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn unmarshal<'de>(&self, _: &'de [u8], _: &mut DeserializeFn<'_, 'de>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_round_trip_struct() {
        let message = sample();
        let bytes = encode(&JsonSerializer, &message).expect("encode");
        let decoded: ChatMessage = decode(&JsonSerializer, &bytes).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_unsized_values_encode() {
        let bytes = encode(&JsonSerializer, "plain").expect("encode");
        assert_eq!(bytes, br#""plain""#);

        let bytes = encode(&JsonSerializer, &[1_u8, 2][..]).expect("encode");
        assert_eq!(bytes, b"[1,2]");
    }

    #[test]
    fn test_non_string_keys_fail_to_encode() {
        let mut grid = HashMap::new();
        grid.insert((1, 2), "x");

        let err = encode(&JsonSerializer, &grid).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn test_malformed_input_fails_to_decode() {
        let err = decode::<ChatMessage>(&JsonSerializer, b"{not json").unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
    }

    #[test]
    fn test_shape_mismatch_fails_to_decode() {
        let err = decode::<ChatMessage>(&JsonSerializer, br#"{"room": 5}"#).unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
    }

    #[test]
    fn test_binary_serializer_round_trip() {
        let message = sample();
        let bytes = encode(&BincodeSerializer, &message).expect("encode");
        assert_eq!(bytes, bincode::DefaultOptions::new().serialize(&message).unwrap());

        let decoded: ChatMessage = decode(&BincodeSerializer, &bytes).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_binary_serializer_keeps_bytes_compact() {
        let chunk = Chunk {
            seq: 7,
            payload: vec![0xAB; 256],
        };

        let binary = encode(&BincodeSerializer, &chunk).expect("encode");
        let json = encode(&JsonSerializer, &chunk).expect("encode");
        assert!(binary.len() < 270, "{} bytes", binary.len());
        assert!(json.len() > 4 * 256);

        assert_eq!(decode::<Chunk>(&BincodeSerializer, &binary).unwrap(), chunk);
    }

    #[test]
    fn test_binary_serializer_accepts_non_finite_floats() {
        let bytes = encode(&BincodeSerializer, &f64::INFINITY).expect("encode");
        assert_eq!(decode::<f64>(&BincodeSerializer, &bytes).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_truncated_binary_fails_to_decode() {
        let bytes = encode(&BincodeSerializer, &sample()).expect("encode");
        let err = decode::<ChatMessage>(&BincodeSerializer, &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(err.is_codec_error());
    }

    #[test]
    fn test_serializer_without_value_fails_to_decode() {
        let err = decode::<u32>(&Silent, b"ignored").unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
    }
}

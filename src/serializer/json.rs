//! Default JSON encoding.

use serde::Serialize;

use crate::error::{Error, Result};

use super::finite::FiniteFloats;
use super::{DeserializeFn, Serializer};

/// Default serializer: compact UTF-8 JSON.
///
/// NaN and infinities have no JSON representation and fail to encode
/// instead of being written as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
        Serialize::serialize(value, FiniteFloats).map_err(|e| Error::encoding(e.to_string()))?;
        serde_json::to_vec(value).map_err(|e| Error::encoding(e.to_string()))
    }

    fn unmarshal<'de>(&self, data: &'de [u8], visit: &mut DeserializeFn<'_, 'de>) -> Result<()> {
        let mut de = serde_json::Deserializer::from_slice(data);
        visit(&mut <dyn erased_serde::Deserializer>::erase(&mut de))
            .map_err(|e| Error::decoding(e.to_string()))?;
        de.end().map_err(|e| Error::decoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::serializer::{decode, encode};

    #[derive(Serialize)]
    struct Reading {
        sensor: &'static str,
        value: f32,
    }

    #[test]
    fn test_marshal_is_compact_json() {
        let bytes = JsonSerializer
            .marshal(&json!({ "op": "ping", "n": [1, 2] }))
            .expect("marshal");
        assert_eq!(bytes, br#"{"n":[1,2],"op":"ping"}"#);
    }

    #[test]
    fn test_non_finite_floats_fail_to_encode() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = encode(&JsonSerializer, &value).unwrap_err();
            assert!(matches!(err, Error::Encoding { .. }), "{value}");
        }

        let nested = vec![Reading {
            sensor: "t1",
            value: f32::NAN,
        }];
        assert!(encode(&JsonSerializer, &nested).unwrap_err().is_codec_error());
    }

    #[test]
    fn test_finite_floats_encode() {
        let bytes = encode(&JsonSerializer, &Reading { sensor: "t1", value: 1.5 }).expect("encode");
        assert_eq!(bytes, br#"{"sensor":"t1","value":1.5}"#);
    }

    #[test]
    fn test_trailing_garbage_fails_to_decode() {
        let err = decode::<u32>(&JsonSerializer, b"1 2").unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
    }
}

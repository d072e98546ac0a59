//! Type-tagged value encoding.
//!
//! An encoded value is the value's byte representation followed by a single
//! tag byte:
//!
//! ```text
//! null   -> ""              || 0x00
//! bool   -> "1" | "0"       || 0x01
//! int    -> decimal digits  || 0x02
//! float  -> shortest repr   || 0x03
//! string -> UTF-8 bytes     || 0x04
//! json   -> serde_json      || 0x05
//! ```
//!
//! The signing engine stores the payload and the tag in separate segments, so
//! both halves are exposed through [`encode_parts`] and [`decode_parts`].

use common::{CryptoError, Value};

/// Trailing type marker of an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Null = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Text = 4,
    Json = 5,
}

impl TypeTag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Result<Self, CryptoError> {
        match b {
            0 => Ok(TypeTag::Null),
            1 => Ok(TypeTag::Bool),
            2 => Ok(TypeTag::Int),
            3 => Ok(TypeTag::Float),
            4 => Ok(TypeTag::Text),
            5 => Ok(TypeTag::Json),
            other => Err(CryptoError::TypeDecode(format!("unknown type tag {other}"))),
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Text(_) => TypeTag::Text,
            Value::Structured(_) => TypeTag::Json,
        }
    }
}

/// Encode `value` as payload bytes followed by its tag byte.
pub fn encode(value: &Value) -> Result<Vec<u8>, CryptoError> {
    let (mut bytes, tag) = encode_parts(value)?;
    bytes.push(tag.as_byte());
    Ok(bytes)
}

/// Decode bytes produced by [`encode`].
///
/// # Errors
///
/// Returns [`CryptoError::TypeDecode`] if the input is empty, the tag is
/// unknown, or the payload does not parse as the tagged type.
pub fn decode(bytes: &[u8]) -> Result<Value, CryptoError> {
    let (tag, payload) = bytes
        .split_last()
        .ok_or_else(|| CryptoError::TypeDecode("empty payload has no type tag".into()))?;
    decode_parts(payload, TypeTag::from_byte(*tag)?)
}

/// Encode `value` without appending the tag.
pub fn encode_parts(value: &Value) -> Result<(Vec<u8>, TypeTag), CryptoError> {
    let bytes = match value {
        Value::Null => Vec::new(),
        Value::Bool(b) => {
            if *b {
                b"1".to_vec()
            } else {
                b"0".to_vec()
            }
        }
        Value::Int(i) => i.to_string().into_bytes(),
        Value::Float(f) => f.to_string().into_bytes(),
        Value::Text(s) => s.as_bytes().to_vec(),
        Value::Structured(v) => serde_json::to_vec(v)
            .map_err(|e| CryptoError::TypeMismatch(format!("value is not serialisable: {e}")))?,
    };
    Ok((bytes, TypeTag::of(value)))
}

/// Rebuild a value from its payload and tag.
pub fn decode_parts(payload: &[u8], tag: TypeTag) -> Result<Value, CryptoError> {
    match tag {
        TypeTag::Null if payload.is_empty() => Ok(Value::Null),
        TypeTag::Null => Err(CryptoError::TypeDecode("null value carries a payload".into())),
        TypeTag::Bool => match payload {
            b"1" => Ok(Value::Bool(true)),
            b"0" => Ok(Value::Bool(false)),
            _ => Err(CryptoError::TypeDecode("invalid bool payload".into())),
        },
        TypeTag::Int => decode_int(as_utf8(payload)?),
        TypeTag::Float => decode_float(as_utf8(payload)?),
        TypeTag::Text => Ok(Value::Text(as_utf8(payload)?.to_owned())),
        TypeTag::Json => serde_json::from_slice(payload)
            .map(Value::Structured)
            .map_err(|e| CryptoError::TypeDecode(format!("invalid json payload: {e}"))),
    }
}

fn as_utf8(payload: &[u8]) -> Result<&str, CryptoError> {
    std::str::from_utf8(payload)
        .map_err(|_| CryptoError::TypeDecode("payload is not valid UTF-8".into()))
}

/// Integers beyond `i64` come back as their decimal text.
fn decode_int(s: &str) -> Result<Value, CryptoError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    let digits = s.strip_prefix('-').unwrap_or(s);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(Value::Text(s.to_owned()))
    } else {
        Err(CryptoError::TypeDecode(format!("invalid int payload: {s:?}")))
    }
}

/// Floats that overflow `f64` come back as their original text.
fn decode_float(s: &str) -> Result<Value, CryptoError> {
    let f = s
        .parse::<f64>()
        .map_err(|_| CryptoError::TypeDecode(format!("invalid float payload: {s:?}")))?;
    let unsigned = s.trim_start_matches(['-', '+']);
    let literal_infinity =
        unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity");
    if f.is_infinite() && !literal_infinity {
        Ok(Value::Text(s.to_owned()))
    } else {
        Ok(Value::Float(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(v: Value) {
        let encoded = encode(&v).unwrap();
        assert_eq!(decode(&encoded).unwrap(), v);
    }

    #[test]
    fn every_variant_round_trips() {
        round_trip(Value::Null);
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Int(0));
        round_trip(Value::Int(i64::MIN));
        round_trip(Value::Int(i64::MAX));
        round_trip(Value::Float(-0.125));
        round_trip(Value::Float(1e300));
        round_trip(Value::Text(String::new()));
        round_trip(Value::Text("héllo".into()));
        round_trip(Value::Structured(json!([1, "two", {"three": null}])));
    }

    #[test]
    fn tag_is_last_byte() {
        assert_eq!(encode(&Value::Int(42)).unwrap(), b"42\x02");
        assert_eq!(encode(&Value::Null).unwrap(), vec![0u8]);
        assert_eq!(encode(&Value::Text("a".into())).unwrap(), b"a\x04");
    }

    #[test]
    fn unknown_tag_is_type_decode_error() {
        let err = decode(b"abc\x09").unwrap_err();
        assert!(matches!(err, CryptoError::TypeDecode(_)));
    }

    #[test]
    fn empty_input_is_type_decode_error() {
        assert!(matches!(decode(b"").unwrap_err(), CryptoError::TypeDecode(_)));
    }

    #[test]
    fn oversized_int_stays_text() {
        let big = "123456789012345678901234567890";
        let mut bytes = big.as_bytes().to_vec();
        bytes.push(TypeTag::Int.as_byte());
        assert_eq!(decode(&bytes).unwrap(), Value::Text(big.into()));
    }

    #[test]
    fn non_numeric_int_rejected() {
        assert!(decode(b"12a\x02").is_err());
        assert!(decode(b"-\x02").is_err());
    }

    #[test]
    fn overflowing_float_stays_text() {
        let mut bytes = b"1e400".to_vec();
        bytes.push(TypeTag::Float.as_byte());
        assert_eq!(decode(&bytes).unwrap(), Value::Text("1e400".into()));
    }

    #[test]
    fn infinity_literals_decode_as_float_in_any_case() {
        for (text, expected) in [
            ("Infinity", f64::INFINITY),
            ("INF", f64::INFINITY),
            ("-inf", f64::NEG_INFINITY),
            ("+INFINITY", f64::INFINITY),
        ] {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(TypeTag::Float.as_byte());
            assert_eq!(decode(&bytes).unwrap(), Value::Float(expected), "{text}");
        }
    }

    #[test]
    fn invalid_bool_rejected() {
        assert!(decode(b"yes\x01").is_err());
    }
}

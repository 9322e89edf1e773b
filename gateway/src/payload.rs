//! JSON payloads
//!
//! Inbound payloads are decoded once into [`Value`] so handlers match on the
//! variant instead of probing a dynamic JSON tree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};

use crate::error::PayloadError;

/// A decoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Object(Map<String, serde_json::Value>),
}

impl Value {
    /// Decode a raw payload.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let json: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| PayloadError::Json(e.to_string()))?;
        Value::try_from(json)
    }

    /// Encode the value as JSON text.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(self).map_err(|e| PayloadError::Json(e.to_string()))
    }

    /// Name of the JSON type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// A number value, or `Null` for NaN and infinities.
    pub fn from_f64(f: f64) -> Self {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = PayloadError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => Ok(Value::Number(n)),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Object(map) => Ok(Value::Object(map)),
            serde_json::Value::Array(_) => Err(PayloadError::Unsupported("array")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("null", Value::Null)]
    #[case("true", Value::Bool(true))]
    #[case("80", Value::from(80u8))]
    #[case("\"hello\"", Value::from("hello"))]
    fn test_decode_scalars(#[case] payload: &str, #[case] expected: Value) {
        assert_eq!(Value::decode(payload.as_bytes()).unwrap(), expected);
    }

    #[test]
    fn test_decode_object() {
        let value = Value::decode(br#"{"topic": "a", "n": 1}"#).unwrap();
        let Value::Object(map) = value else {
            panic!("expected object, got {value:?}");
        };
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_decode_rejects_arrays_and_garbage() {
        assert_eq!(
            Value::decode(b"[1, 2]"),
            Err(PayloadError::Unsupported("array"))
        );
        assert!(matches!(Value::decode(b"{oops"), Err(PayloadError::Json(_))));
        assert!(matches!(Value::decode(b""), Err(PayloadError::Json(_))));
    }

    #[test]
    fn test_encode_keeps_integers_integral() {
        assert_eq!(Value::from(80u8).encode().unwrap(), b"80".to_vec());
        assert_eq!(Value::from(true).encode().unwrap(), b"true".to_vec());
        assert_eq!(Value::Null.encode().unwrap(), b"null".to_vec());
        assert_eq!(Value::from_f64(21.5).encode().unwrap(), b"21.5".to_vec());
        assert_eq!(Value::from_f64(f64::NAN), Value::Null);
    }

    #[test]
    fn test_accessors_and_kind() {
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(3u8).as_bool(), None);
        assert_eq!(Value::from(3u8).as_f64(), Some(3.0));
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::Null.kind(), "null");
    }
}

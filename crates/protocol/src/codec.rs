//! Payload codec for call params and responses.
//!
//! Transports hand payloads over either already parsed or as JSON text;
//! both normalize to a single JSON object here. Decoding never touches
//! session state, so a rejected payload is always a no-op upstream.

use {
    serde::Serialize,
    serde_json::{Map, Value},
};

/// Payload could not be turned into a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Normalize a structured value or its serialized text form into an object.
pub fn decode(raw: Value) -> Result<Map<String, Value>, DecodeError> {
    match raw {
        Value::Object(map) => Ok(map),
        Value::String(text) => decode_str(&text),
        other => Err(not_an_object(&other)),
    }
}

/// Parse serialized text into an object.
pub fn decode_str(text: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| DecodeError::new(format!("malformed JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(not_an_object(&other)),
    }
}

/// Serialize a payload to its wire text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Size of a payload in its wire form. Text payloads count their own length.
pub fn encoded_len(value: &Value) -> usize {
    match value {
        Value::String(text) => text.len(),
        other => serde_json::to_vec(other).map_or(0, |bytes| bytes.len()),
    }
}

fn not_an_object(value: &Value) -> DecodeError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    DecodeError::new(format!("payload must be a JSON object, got {kind}"))
}

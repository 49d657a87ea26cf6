//! Checked access into decoded JSON payloads
//!
//! Payloads arrive as arbitrary JSON. Every shape requirement a rule places
//! on them goes through one of these helpers so that a mismatch becomes a
//! [`RouteError`] instead of a silent default.

use serde_json::{Map, Value};

use super::RouteError;

/// A decoded payload: a JSON object
pub type Payload = Map<String, Value>;

/// Decode raw bytes as a JSON object
pub fn decode_payload(raw: &[u8]) -> Result<Payload, RouteError> {
    serde_json::from_slice::<Payload>(raw).map_err(|e| RouteError::InvalidJson(e.to_string()))
}

/// Require `field` to be present and an object
pub fn require_object<'a>(payload: &'a Payload, field: &'static str) -> Result<&'a Payload, RouteError> {
    match payload.get(field) {
        Some(Value::Object(obj)) => Ok(obj),
        Some(other) => Err(RouteError::WrongType {
            field,
            expected: "object",
            found: json_type(other),
        }),
        None => Err(RouteError::MissingField(field)),
    }
}

/// Require `field` to be present and a string
pub fn require_str<'a>(payload: &'a Payload, field: &'static str) -> Result<&'a str, RouteError> {
    match payload.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RouteError::WrongType {
            field,
            expected: "string",
            found: json_type(other),
        }),
        None => Err(RouteError::MissingField(field)),
    }
}

/// Copy `field` out as-is; absent fields become `null`
pub fn passthrough(payload: &Payload, field: &str) -> Value {
    payload.get(field).cloned().unwrap_or(Value::Null)
}

/// Tasmota `POWER` status: `"ON"` or `"OFF"`, nothing else
pub fn parse_power(status: &str) -> Result<bool, RouteError> {
    match status {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(RouteError::UnsupportedStatus(other.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! JSON config documents carrying an embedded integer version field.

use serde_json::{Map, Value};

use crate::error::{IotaError, IotaResult};

/// JSON object form of a config document.
pub type Document = Map<String, Value>;

/// Parse bytes as a JSON object. Arrays, scalars and invalid JSON fail.
pub fn parse_document(bytes: &[u8]) -> IotaResult<Document> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(IotaError::Serialization(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
    }
}

/// Read the integer under `field`.
///
/// `Ok(None)` when the field is absent. Numbers and digit strings are both
/// accepted (`1` and `"1"`); anything else is an error.
pub fn embedded_version(doc: &Document, field: &str) -> IotaResult<Option<u64>> {
    let invalid = || IotaError::Serialization(format!("{} is not a non-negative integer", field));
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Stored version of a document, with absent or unreadable fields read as 0.
pub fn stored_version(doc: &Document, field: &str) -> u64 {
    embedded_version(doc, field).ok().flatten().unwrap_or(0)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

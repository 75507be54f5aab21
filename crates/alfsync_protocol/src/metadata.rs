//! Node metadata flattening.

use crate::error::{ProtocolError, ProtocolResult};
use crate::FieldMap;
use serde_json::Value;

const PROPERTIES: &str = "properties";
const NAME: &str = "name";
const VALUE: &str = "value";

/// Parses a metadata response body and flattens its properties.
pub fn parse_metadata(body: &[u8]) -> ProtocolResult<FieldMap> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => flatten_metadata(map),
        Ok(other) => Err(ProtocolError::InvalidJson(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ProtocolError::InvalidJson(e.to_string())),
    }
}

/// Removes the `properties` list and folds each `{name, value}` entry into
/// the top level.
///
/// A property whose name matches an existing top-level key overwrites it.
/// Later properties overwrite earlier ones.
pub fn flatten_metadata(mut map: FieldMap) -> ProtocolResult<FieldMap> {
    let properties = match map.remove(PROPERTIES) {
        Some(Value::Array(properties)) => properties,
        Some(other) => {
            return Err(ProtocolError::malformed(
                format!("{PROPERTIES} is not a list, it is {}", json_type(&other)),
                &other,
            ))
        }
        None => {
            tracing::warn!("Metadata response has no {} list", PROPERTIES);
            return Ok(map);
        }
    };

    for property in properties {
        let mut entry = match property {
            Value::Object(entry) => entry,
            other => {
                return Err(ProtocolError::malformed(
                    "metadata property must be an object",
                    &other,
                ))
            }
        };
        let name = match entry.remove(NAME) {
            Some(Value::String(name)) => name,
            _ => {
                return Err(ProtocolError::malformed(
                    "metadata property name must be a string",
                    &Value::Object(entry),
                ))
            }
        };
        map.insert(name, entry.remove(VALUE).unwrap_or(Value::Null));
    }

    Ok(map)
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

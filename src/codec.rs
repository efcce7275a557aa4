//! Key/Value Codec
//!
//! Canonical JSON encoding shared by every backend. Object members are
//! sorted by name, so logically identical keys always encode to the same
//! string regardless of field or insertion order.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Encodes any serializable value to its canonical string form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(value).to_string())
}

/// Decodes a string produced by [`encode`].
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    Ok(serde_json::from_str(encoded)?)
}

/// Rebuilds a value with every object's members in sorted order.
///
/// Default `serde_json` maps are already sorted, but any crate in the build
/// enabling `preserve_order` switches them to insertion order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(String, Value)> = map.into_iter().collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = members
                .into_iter()
                .map(|(name, member)| (name, canonicalize(member)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

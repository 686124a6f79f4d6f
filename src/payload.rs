//! Raw message payloads.
//!
//! A `Payload` is a key/value mapping restricted to property-list safe values:
//! strings, numbers, booleans, arrays and nested mappings. JSON `null` has no
//! property-list representation and is rejected at construction time.
//!
//! # Examples
//!
//! ```
//! use peerlink::Payload;
//! use serde_json::json;
//!
//! let payload = Payload::from_json(json!({"k": "v", "n": 3})).unwrap();
//! assert_eq!(payload.get("k"), Some(&json!("v")));
//!
//! assert!(Payload::from_json(json!({"k": null})).is_err());
//! assert!(Payload::from_json(json!([1, 2])).is_err());
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Reserved payload key carrying the type hint of an encoded typed message.
pub const TYPE_HINT_KEY: &str = "__type";

/// Property-list safe key/value mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a payload from a JSON object, validating every nested value.
    pub fn from_json(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Object(map) => Self::try_from(map),
            other => Err(CodecError::NotAMapping {
                found: json_type_name(&other),
            }),
        }
    }

    /// Inserts a value, rejecting values that are not property-list safe.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), CodecError> {
        let key = key.into();
        let value = value.into();
        validate(&value, &key)?;
        self.0.insert(key, value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The type hint embedded by `Messagable::to_payload`, if any.
    #[must_use]
    pub fn type_hint(&self) -> Option<&str> {
        self.0.get(TYPE_HINT_KEY).and_then(Value::as_str)
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Map<String, Value>> for Payload {
    type Error = CodecError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        for (key, value) in &map {
            validate(value, key)?;
        }
        Ok(Self(map))
    }
}

impl From<Payload> for Map<String, Value> {
    fn from(payload: Payload) -> Self {
        payload.0
    }
}

fn validate(value: &Value, path: &str) -> Result<(), CodecError> {
    match value {
        Value::Null => Err(CodecError::UnsupportedValue {
            path: path.to_string(),
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(idx, item)| validate(item, &format!("{path}[{idx}]"))),
        Value::Object(map) => map
            .iter()
            .try_for_each(|(key, item)| validate(item, &format!("{path}.{key}"))),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A value with a stable encode contract that can travel as a `Payload`.
///
/// The default methods round-trip through `serde_json` and tag the payload
/// with [`TYPE_HINT_KEY`] so the receiving side can pick the decoder.
///
/// ```
/// use peerlink::{Messagable, Payload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Ack {
///     ok: bool,
/// }
///
/// impl Messagable for Ack {
///     const TYPE_HINT: &'static str = "Ack";
/// }
///
/// let payload = Ack { ok: true }.to_payload().unwrap();
/// assert_eq!(payload.type_hint(), Some("Ack"));
/// assert_eq!(Ack::from_payload(&payload).unwrap(), Ack { ok: true });
/// ```
pub trait Messagable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable name identifying this type on the wire.
    const TYPE_HINT: &'static str;

    /// Encodes `self` into a tagged payload.
    fn to_payload(&self) -> Result<Payload, CodecError> {
        let encode_err = |message: String| CodecError::Encode {
            type_hint: Self::TYPE_HINT.to_string(),
            message,
        };

        let value = serde_json::to_value(self).map_err(|e| encode_err(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(encode_err(format!(
                "expected a mapping, got {}",
                json_type_name(&value)
            )));
        };

        let mut payload = Payload::try_from(map)?;
        payload.0.insert(TYPE_HINT_KEY.to_string(), Value::String(Self::TYPE_HINT.to_string()));
        Ok(payload)
    }

    /// Decodes a payload, ignoring the embedded type tag.
    fn from_payload(payload: &Payload) -> Result<Self, CodecError> {
        let mut map = payload.0.clone();
        map.remove(TYPE_HINT_KEY);
        serde_json::from_value(Value::Object(map)).map_err(|e| CodecError::Decode {
            type_hint: Self::TYPE_HINT.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Workout {
        kind: String,
        minutes: u32,
        note: Option<String>,
    }

    impl Messagable for Workout {
        const TYPE_HINT: &'static str = "Workout";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Bare(u32);

    impl Messagable for Bare {
        const TYPE_HINT: &'static str = "Bare";
    }

    #[test]
    fn nested_null_is_rejected_with_path() {
        let err = Payload::from_json(json!({"a": {"b": [1, null]}})).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedValue {
                path: "a.b[1]".to_string()
            }
        );
    }

    #[test]
    fn insert_validates_value() {
        let mut payload = Payload::new();
        payload.insert("k", "v").unwrap();
        assert!(payload.insert("n", Value::Null).is_err());
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn deserialize_goes_through_validation() {
        let ok: Payload = serde_json::from_str(r#"{"k":"v"}"#).unwrap();
        assert_eq!(ok.get("k"), Some(&json!("v")));
        assert!(serde_json::from_str::<Payload>(r#"{"k":null}"#).is_err());
    }

    #[test]
    fn typed_encode_fails_on_null_field() {
        let workout = Workout {
            kind: "run".to_string(),
            minutes: 30,
            note: None,
        };
        let err = workout.to_payload().unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedValue { ref path } if path == "note"));
    }

    #[test]
    fn typed_encode_rejects_non_mapping() {
        let err = Bare(3).to_payload().unwrap_err();
        assert!(matches!(err, CodecError::Encode { ref type_hint, .. } if type_hint == "Bare"));
    }

    #[test]
    fn typed_decode_reports_type_hint() {
        let payload = Payload::from_json(json!({"kind": "run"})).unwrap();
        let err = Workout::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CodecError::Decode { ref type_hint, .. } if type_hint == "Workout"));
    }

    #[test]
    fn typed_roundtrip_strips_tag() {
        let workout = Workout {
            kind: "swim".to_string(),
            minutes: 45,
            note: Some("pool".to_string()),
        };
        let payload = workout.to_payload().unwrap();
        assert_eq!(payload.type_hint(), Some("Workout"));
        assert_eq!(Workout::from_payload(&payload).unwrap(), workout);
    }
}

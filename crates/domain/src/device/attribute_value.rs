//! Typed attribute values attached to devices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(Value),
}

impl From<&Value> for AttributeValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Json(value.clone())),
            Value::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_serialize_string_variant_as_plain_string() {
        let val = AttributeValue::String("Fresh".to_string());
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, "\"Fresh\"");
    }

    #[test]
    fn should_convert_integer_json_to_int() {
        assert_eq!(AttributeValue::from(&json!(87)), AttributeValue::Int(87));
    }

    #[test]
    fn should_convert_fractional_json_to_float() {
        assert_eq!(AttributeValue::from(&json!(13.4)), AttributeValue::Float(13.4));
    }

    #[test]
    fn should_keep_null_as_json() {
        assert_eq!(
            AttributeValue::from(&Value::Null),
            AttributeValue::Json(Value::Null)
        );
    }

    #[test]
    fn should_keep_objects_as_json() {
        let value = json!({"nested": "value"});
        assert!(matches!(AttributeValue::from(&value), AttributeValue::Json(_)));
    }
}

//! Caller-supplied hard filters and soft preferences.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

/// Mapping from filter key to raw value.
///
/// Values are kept as JSON until compilation so that a malformed value only
/// drops its own key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec(Map<String, Value>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a spec from a JSON payload. `null` is the empty spec; anything
    /// other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(EngineError::invalid_input(format!(
                "filters must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Adds or replaces a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for FilterSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        FilterSpec::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        assert!(FilterSpec::from_value(json!(null)).unwrap().is_empty());

        let spec = FilterSpec::from_value(json!({"min_price": 2000000, "tenure": ["Bostadsrätt"]}))
            .unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.get("min_price"), Some(&json!(2000000)));

        let err = FilterSpec::from_value(json!(["min_price"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_deserialize_rejects_non_objects() {
        let spec: FilterSpec = serde_json::from_str(r#"{"bbox": "18.0,59.3,18.1,59.4"}"#).unwrap();
        assert_eq!(spec.keys().collect::<Vec<_>>(), vec!["bbox"]);
        assert!(serde_json::from_str::<FilterSpec>("42").is_err());
    }

    #[test]
    fn test_builder() {
        let spec = FilterSpec::new()
            .with("min_rooms", 3)
            .with("municipalities", json!(["Solna"]));
        assert_eq!(spec.len(), 2);
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"min_rooms": 3, "municipalities": ["Solna"]})
        );
    }
}

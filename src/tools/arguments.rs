//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::BridgeError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            value: Value::Object(map),
        }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Arguments as an object; JSON-encoded strings are decoded, anything else is empty.
    pub fn to_map(&self) -> Map<String, Value> {
        crate::util::json::normalize_args(&self.value)
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, BridgeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get a list of strings; non-string items are dropped.
    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>, BridgeError> {
        let items = self.get_array(key)?;
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// Get an array argument.
    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>, BridgeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing array argument: {key}")))
    }

    /// Get a nested object.
    pub fn get_object(&self, key: &str) -> Result<&Map<String, Value>, BridgeError> {
        self.value
            .get(key)
            .and_then(|v| v.as_object())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing object argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, BridgeError> {
        let value = match &self.value {
            Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str::<Value>(trimmed).map_err(|e| {
                        BridgeError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
                    })?
                }
            }
            Value::Null => serde_json::json!({}),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            BridgeError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

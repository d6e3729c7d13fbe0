//! Parameter schemas for locally executed tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema describing a tool's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    pub schema: Value,
}

impl ToolParameters {
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// Open object schema used when a source provides none.
    pub fn permissive() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true,
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder::default()
    }
}

/// Builder for constructing tool parameter schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = json!({"type": "string", "description": description.into()});
        self.property(name, schema, required)
    }

    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        let schema = json!({
            "type": "string",
            "description": description.into(),
            "enum": values,
        });
        self.property(name, schema, required)
    }

    /// Add an array property whose items follow `items`.
    pub fn array(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        items: Value,
        required: bool,
    ) -> Self {
        let schema = json!({
            "type": "array",
            "description": description.into(),
            "items": items,
        });
        self.property(name, schema, required)
    }

    pub fn build(self) -> ToolParameters {
        let mut schema = json!({
            "type": "object",
            "properties": self.properties,
        });
        if !self.required.is_empty() {
            schema["required"] = json!(self.required);
        }
        ToolParameters { schema }
    }
}

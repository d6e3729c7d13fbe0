//! Validate tool call arguments against a parameter schema before execution.

use serde_json::Value;

use crate::error::BridgeError;

/// Validate `args` against `schema`.
///
/// Checks the top-level type, required fields, declared property types and
/// string enums. The first violation is reported as an invalid argument
/// naming the tool.
pub fn validate_arguments(tool_name: &str, args: &Value, schema: &Value) -> Result<(), BridgeError> {
    check(args, schema).map_err(|message| {
        BridgeError::InvalidArgument(format!("{tool_name}: {message}"))
    })
}

fn check(args: &Value, schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!(
            "expected object arguments, got {}",
            json_type_name(args)
        ));
    }
    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            if !value_matches_type(value, expected) {
                return Err(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    json_type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!("field '{key}' must be one of {}", Value::Array(allowed.clone())));
            }
        }
    }
    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
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
    use serde_json::json;

    fn chart_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["line", "bar", "scatter", "pie", "donut"]},
                "data": {"type": "array"},
                "x_key": {"type": "string"},
            },
            "required": ["type", "data"],
        })
    }

    #[test]
    fn rejects_string_arguments_for_object_schema() {
        let err = validate_arguments("openbb_create_chart", &json!("{}"), &chart_schema()).unwrap_err();
        assert!(err.to_string().contains("expected object arguments"));
        assert!(err.to_string().contains("openbb_create_chart"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = validate_arguments("chart", &json!({"type": "bar"}), &chart_schema()).unwrap_err();
        assert!(err.to_string().contains("missing required field 'data'"));
    }

    #[test]
    fn rejects_wrong_property_type() {
        let args = json!({"type": "bar", "data": {"rows": 1}});
        let err = validate_arguments("chart", &args, &chart_schema()).unwrap_err();
        assert!(err.to_string().contains("field 'data' expected type 'array'"));
    }

    #[test]
    fn rejects_value_outside_enum() {
        let args = json!({"type": "area", "data": []});
        let err = validate_arguments("chart", &args, &chart_schema()).unwrap_err();
        assert!(err.to_string().contains("field 'type' must be one of"));
    }

    #[test]
    fn accepts_extra_fields_and_permissive_schemas() {
        let args = json!({"type": "line", "data": [], "x_key": "date", "note": 1});
        assert!(validate_arguments("chart", &args, &chart_schema()).is_ok());
        assert!(validate_arguments("any", &json!({"a": 1}), &json!({})).is_ok());
        assert!(validate_arguments("any", &Value::Null, &json!({})).is_ok());
    }
}

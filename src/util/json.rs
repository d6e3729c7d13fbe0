//! Lenient JSON helpers for payloads that may be double-encoded or loosely typed.

use serde_json::{Map, Value};

/// Parse a JSON document, keeping the original text when it is not JSON.
pub fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Repeatedly decode JSON strings, at most `max_depth` times.
pub fn decode_nested(mut value: Value, max_depth: usize) -> Value {
    let mut depth = 0;
    while depth < max_depth {
        let Value::String(raw) = &value else {
            break;
        };
        let parsed = parse_json(raw);
        if parsed == value {
            break;
        }
        value = parsed;
        depth += 1;
    }
    value
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Coerce tool-call arguments into an object.
pub fn normalize_args(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(raw) => match parse_json(raw) {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

/// First string value found under any of `keys`.
pub fn get_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| map.get(*key).and_then(Value::as_str))
}

/// First string list (or lone string) found under any of `keys`.
pub fn get_str_list(map: &Map<String, Value>, keys: &[&str]) -> Option<Vec<String>> {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(s)) => return Some(vec![s.clone()]),
            Some(Value::Array(items)) => {
                let strings: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if !strings.is_empty() {
                    return Some(strings);
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate to `max_chars` characters, ending in `...` when cut.
pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = value.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Cut to at most `max_chars` characters without a marker.
pub fn clip(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_json_falls_back_to_string() {
        assert_eq!(parse_json("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_json("not json"), json!("not json"));
    }

    #[test]
    fn decode_nested_stops_at_depth() {
        let once = serde_json::to_string(&json!([{"a": 1}])).unwrap();
        let twice = serde_json::to_string(&once).unwrap();
        assert_eq!(decode_nested(json!(twice), 3), json!([{"a": 1}]));
        assert_eq!(decode_nested(json!(twice.clone()), 1), json!(once));
    }

    #[test]
    fn normalize_args_parses_json_strings() {
        let args = normalize_args(&json!("{\"symbol\":\"AAPL\"}"));
        assert_eq!(args.get("symbol"), Some(&json!("AAPL")));
        assert!(normalize_args(&json!(42)).is_empty());
    }

    #[test]
    fn get_str_list_accepts_single_string() {
        let map = json!({"y_key": "close"});
        let map = map.as_object().unwrap();
        assert_eq!(
            get_str_list(map, &["y_keys", "y_key"]),
            Some(vec!["close".to_string()])
        );
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("äöü", 3), "äöü");
        assert_eq!(clip("héllo", 2), "hé");
    }
}

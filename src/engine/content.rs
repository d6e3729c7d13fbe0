//! Classify structured tool output into artifacts, text and reasoning steps.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::format::{format_arg_value, Details};
use crate::config::limits::{MAX_NESTED_JSON_DECODE_DEPTH, MAX_TABLE_PARSE_DEPTH};
use crate::types::{
    ChartParams, ChartType, ClientArtifact, HostEvent, ReasoningStep, StepLevel, Widget,
};
use crate::util::json::{decode_nested, get_str, get_str_list, parse_json};

/// A widget (when known) paired with the arguments it was fetched with.
pub type WidgetEntry = (Option<Widget>, Map<String, Value>);

const PDF_WARNING: &str = "PDF content received but could not be extracted.";

/// Recognize a chart, table or html payload in generic tool output.
///
/// A recognized chart type with missing keys falls through to table
/// detection instead of failing.
pub fn artifact_from_output(output: &Value) -> Option<ClientArtifact> {
    if let Value::Object(map) = output {
        let name = map.get("name").and_then(Value::as_str);
        let description = map.get("description").and_then(Value::as_str);
        let output_type = map.get("type").and_then(Value::as_str);

        if output_type == Some("html") {
            if let Some(content) = get_str(map, &["content", "html"]) {
                return Some(ClientArtifact::html(content, name, description));
            }
        }

        if let Some(chart) = output_type
            .and_then(|t| t.parse::<ChartType>().ok())
            .and_then(|chart_type| chart_from_map(chart_type, map))
        {
            return Some(chart);
        }

        let table_rows = match (map.get("table"), map.get("data")) {
            (Some(Value::Array(rows)), _) => Some(rows.clone()),
            (_, Some(Value::Array(rows))) if rows.iter().all(Value::is_object) => Some(rows.clone()),
            _ => None,
        };
        if let Some(rows) = table_rows.filter(|rows| !rows.is_empty()) {
            return Some(ClientArtifact::table(rows, name, description));
        }
        return None;
    }

    match output {
        Value::Array(rows) if !rows.is_empty() && rows.iter().all(Value::is_object) => {
            Some(ClientArtifact::table(rows.clone(), None, None))
        }
        _ => None,
    }
}

fn chart_from_map(chart_type: ChartType, map: &Map<String, Value>) -> Option<ClientArtifact> {
    let rows: Vec<Value> = map
        .get("data")
        .and_then(Value::as_array)
        .map(|data| data.iter().filter(|row| row.is_object()).cloned().collect())
        .unwrap_or_default();
    if rows.is_empty() {
        return None;
    }

    let x_key = get_str(map, &["x_key", "xKey"]).filter(|k| !k.is_empty());
    let y_keys = get_str_list(map, &["y_keys", "yKeys", "y_key", "yKey"]);
    let angle_key = get_str(map, &["angle_key", "angleKey"]).filter(|k| !k.is_empty());
    let callout_label_key =
        get_str(map, &["callout_label_key", "calloutLabelKey"]).filter(|k| !k.is_empty());

    let complete = if chart_type.is_cartesian() {
        x_key.is_some() && y_keys.is_some()
    } else {
        angle_key.is_some() && callout_label_key.is_some()
    };
    if !complete {
        return None;
    }

    let params = ChartParams {
        chart_type,
        x_key: x_key.map(str::to_string),
        y_keys,
        angle_key: angle_key.map(str::to_string),
        callout_label_key: callout_label_key.map(str::to_string),
    };
    Some(ClientArtifact::chart(
        params,
        rows,
        map.get("name").and_then(Value::as_str),
        map.get("description").and_then(Value::as_str),
    ))
}

/// Turn a `{"data": [...]}` result payload into host events.
///
/// Returns nothing when the payload has no such shape. Artifacts from every
/// entry are grouped into one trailing `"Data retrieved"` step.
pub fn tool_result_events(content: &Value, widget_entries: &[WidgetEntry]) -> Vec<HostEvent> {
    let Some(data) = content.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut artifacts = Vec::new();

    for (i, entry) in data.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            continue;
        };

        let status = non_empty_str(entry, "status");
        if let (Some(status), Some(message)) = (status, non_empty_str(entry, "message")) {
            events.push(HostEvent::info(format!("[{status}] {message}")));
        }
        if let Some(event) = error_entry(entry) {
            events.push(event);
            continue;
        }

        let scope = if widget_entries.is_empty() {
            ItemScope::default()
        } else if data.len() == 1 {
            ItemScope {
                entries: widget_entries,
                default_widget: None,
            }
        } else if data.len() == widget_entries.len() {
            ItemScope {
                entries: &[],
                default_widget: widget_entries[i].0.as_ref(),
            }
        } else {
            ItemScope::default()
        };

        let Some(items) = entry.get("items").and_then(Value::as_array) else {
            continue;
        };
        for (idx, item) in items.iter().enumerate() {
            let Some(item) = item.as_object() else {
                continue;
            };
            match process_item(item, scope.widget_for(idx)) {
                ItemOutcome::Artifacts(found) => artifacts.extend(found),
                ItemOutcome::Event(event) => events.push(event),
                ItemOutcome::Skip => {}
            }
        }
    }

    if !artifacts.is_empty() {
        events.push(HostEvent::step(
            ReasoningStep::new(StepLevel::Info, "Data retrieved").with_artifacts(artifacts),
        ));
    }
    events
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn error_entry(entry: &Map<String, Value>) -> Option<HostEvent> {
    let error_type = entry.get("error_type").filter(|v| is_truthy(v))?;
    let content = entry.get("content").filter(|v| is_truthy(v))?;
    let message = match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut details = Details::new();
    details.insert("error_type".into(), error_type.clone());
    Some(HostEvent::step(
        ReasoningStep::new(StepLevel::Error, message).with_details(details),
    ))
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

/// Which widget an item of a data entry belongs to.
#[derive(Default)]
struct ItemScope<'a> {
    entries: &'a [WidgetEntry],
    default_widget: Option<&'a Widget>,
}

impl<'a> ItemScope<'a> {
    fn widget_for(&self, idx: usize) -> Option<&'a Widget> {
        self.default_widget
            .or_else(|| self.entries.get(idx).and_then(|(widget, _)| widget.as_ref()))
    }
}

enum ItemOutcome {
    Artifacts(Vec<ClientArtifact>),
    Event(HostEvent),
    Skip,
}

fn process_item(item: &Map<String, Value>, widget: Option<&Widget>) -> ItemOutcome {
    let Some(raw) = item.get("content").and_then(Value::as_str) else {
        return ItemOutcome::Skip;
    };

    let name = non_empty_str(item, "name")
        .map(str::to_string)
        .or_else(|| widget.map(|w| w.name.clone()).filter(|n| !n.is_empty()));
    let description = item.get("description").and_then(Value::as_str);

    let data_format = item.get("data_format").and_then(Value::as_object);
    let format_field = |key: &str| data_format.and_then(|f| f.get(key)).and_then(Value::as_str);
    let parse_as = format_field("parse_as");
    let data_type = format_field("data_type");

    if parse_as == Some("text") {
        return ItemOutcome::Event(HostEvent::text(raw));
    }

    let html_widget = widget.is_some_and(|w| w.widget_id.starts_with("html-"));
    if data_type == Some("html") || html_widget {
        let content = html_from_raw(raw).unwrap_or_else(|| raw.to_string());
        return ItemOutcome::Artifacts(vec![ClientArtifact::html(
            content,
            name.as_deref(),
            description,
        )]);
    }

    match data_type {
        Some("pdf") => return ItemOutcome::Event(HostEvent::warning(PDF_WARNING)),
        Some(other) if other != "object" && other != "json" => {
            return ItemOutcome::Event(HostEvent::warning(format!(
                "Format '{other}' not implemented"
            )));
        }
        _ => {}
    }

    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_nested(value, MAX_NESTED_JSON_DECODE_DEPTH),
        Err(_) => {
            let raw_value = Value::String(raw.to_string());
            if let Some(errors) = error_messages(&raw_value) {
                return ItemOutcome::Event(error_event(errors));
            }
            let display = name.as_deref().unwrap_or("unknown");
            let mut details = Details::new();
            details.insert("name".into(), display.into());
            return ItemOutcome::Event(HostEvent::step(
                ReasoningStep::new(
                    StepLevel::Warning,
                    format!("Failed to parse content for '{display}'"),
                )
                .with_details(details),
            ));
        }
    };

    match item_to_artifacts(&parsed, name.as_deref(), description) {
        Err(event) => ItemOutcome::Event(event),
        Ok(artifacts) if !artifacts.is_empty() => ItemOutcome::Artifacts(artifacts),
        Ok(_) => ItemOutcome::Event(HostEvent::text(raw)),
    }
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..4].to_string()
}

fn item_to_artifacts(
    parsed: &Value,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Vec<ClientArtifact>, HostEvent> {
    if let Some(errors) = error_messages(parsed) {
        return Err(error_event(errors));
    }

    if let Value::Object(map) = parsed {
        if map.get("type").and_then(Value::as_str) == Some("html") {
            if let Some(content) = get_str(map, &["content", "html"]) {
                let name = non_empty_str(map, "name").or(name);
                let description = non_empty_str(map, "description").or(description);
                return Ok(vec![ClientArtifact::html(content, name, description)]);
            }
        }
    }

    if let Some(rows) = extract_table_rows(parsed, MAX_TABLE_PARSE_DEPTH) {
        let name = name.map_or_else(|| format!("Table_{}", short_suffix()), str::to_string);
        return Ok(vec![ClientArtifact::table(
            rows,
            Some(&name),
            Some(description.unwrap_or("Widget data")),
        )]);
    }

    if let Value::Object(map) = parsed {
        if let Some(expanded) = expand_mapping(map, name, description) {
            return Ok(expanded);
        }
        let rows = field_rows(map);
        if !rows.is_empty() {
            let name = name.map_or_else(|| format!("Details_{}", short_suffix()), str::to_string);
            return Ok(vec![ClientArtifact::table(
                rows,
                Some(&name),
                Some(description.unwrap_or("Widget data")),
            )]);
        }
    }
    Ok(Vec::new())
}

/// Rows of a table hidden in `value`: a list of objects, a list of
/// JSON-encoded objects or lists, or a string encoding either.
pub fn extract_table_rows(value: &Value, remaining_depth: usize) -> Option<Vec<Value>> {
    if remaining_depth == 0 {
        return None;
    }

    match value {
        Value::Array(items) if !items.is_empty() => {
            if items.iter().all(Value::is_object) {
                return Some(items.clone());
            }
            let decoded: Option<Vec<Value>> = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|raw| decode_nested(parse_json(raw), MAX_NESTED_JSON_DECODE_DEPTH))
                })
                .collect();
            let decoded = decoded?;
            if let [Value::Array(rows)] = decoded.as_slice() {
                if !rows.is_empty() && rows.iter().all(Value::is_object) {
                    return Some(rows.clone());
                }
            }
            decoded.iter().all(Value::is_object).then_some(decoded)
        }
        Value::String(raw) => {
            let parsed = decode_nested(parse_json(raw), MAX_NESTED_JSON_DECODE_DEPTH);
            if parsed == *value {
                return None;
            }
            extract_table_rows(&parsed, remaining_depth - 1)
        }
        _ => None,
    }
}

/// Split a mapping with nested tables or mappings into one table per key.
fn expand_mapping(
    data: &Map<String, Value>,
    base_name: Option<&str>,
    base_description: Option<&str>,
) -> Option<Vec<ClientArtifact>> {
    let nested = data.values().any(|value| {
        value.is_object() || extract_table_rows(value, MAX_TABLE_PARSE_DEPTH).is_some()
    });
    if !nested {
        return None;
    }

    let mut artifacts = Vec::new();
    for (key, value) in data {
        let name = base_name.map_or_else(|| key.clone(), |base| format!("{base}_{key}"));
        let description =
            base_description.map_or_else(|| key.clone(), |base| format!("{base} - {key}"));

        let rows = match (extract_table_rows(value, MAX_TABLE_PARSE_DEPTH), value) {
            (Some(rows), _) => rows,
            (None, Value::Object(inner)) => field_rows(inner),
            (None, scalar) => vec![json!({"Field": key, "Value": format_arg_value(scalar)})],
        };
        if rows.is_empty() {
            continue;
        }
        artifacts.push(ClientArtifact::table(rows, Some(&name), Some(&description)));
    }
    Some(artifacts)
}

fn field_rows(map: &Map<String, Value>) -> Vec<Value> {
    map.iter()
        .map(|(key, value)| json!({"Field": key, "Value": format_arg_value(value)}))
        .collect()
}

fn looks_like_error(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.starts_with("error") || lowered.starts_with("exception") || lowered.contains("traceback")
}

/// Error-looking strings in common payload shapes.
pub fn error_messages(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Object(map) => {
            let candidate = ["error", "message"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|v| is_truthy(v))?;
            candidate
                .as_str()
                .filter(|text| looks_like_error(text))
                .map(|text| vec![text.to_string()])
        }
        Value::String(text) if looks_like_error(text) => Some(vec![text.clone()]),
        Value::Array(items) if !items.is_empty() => {
            let texts: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            let errors: Vec<String> = texts?
                .into_iter()
                .filter(|text| looks_like_error(text))
                .map(str::to_string)
                .collect();
            (!errors.is_empty()).then_some(errors)
        }
        _ => None,
    }
}

fn error_event(errors: Vec<String>) -> HostEvent {
    let message = errors.first().cloned().unwrap_or_default();
    let mut details = Details::new();
    details.insert(
        "errors".into(),
        Value::Array(errors.into_iter().map(Value::String).collect()),
    );
    HostEvent::step(ReasoningStep::new(StepLevel::Error, message).with_details(details))
}

/// Html markup in a raw item payload, possibly JSON-encoded or wrapped in
/// `{"content": ...}`. Literal `\n` sequences become newlines.
fn html_from_raw(raw: &str) -> Option<String> {
    let unescape = |s: &str| s.replace("\\n", "\n");
    match decode_nested(parse_json(raw), MAX_NESTED_JSON_DECODE_DEPTH) {
        Value::String(s) => Some(unescape(&s)),
        Value::Object(map) => match get_str(&map, &["content", "html"]) {
            Some(content) => Some(unescape(content)),
            None => raw.contains("\\n").then(|| unescape(raw)),
        },
        _ => raw.contains("\\n").then(|| unescape(raw)),
    }
}

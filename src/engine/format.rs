//! Human-readable previews for reasoning step details.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::limits::{
    CONTENT_PREVIEW_MAX_CHARS, LIST_PREVIEW_LIMIT, MAX_ARG_DISPLAY_CHARS, MAX_ARG_PREVIEW_ITEMS,
};
use crate::tools::discovery::MetaTool;
use crate::util::json::{parse_json, to_text, truncate};

/// Reasoning step details: label -> preview text.
pub type Details = Map<String, Value>;

/// Summarize a value so it stays readable inside a details panel.
pub fn format_arg_value(value: &Value) -> String {
    format_arg_value_with(value, MAX_ARG_DISPLAY_CHARS, MAX_ARG_PREVIEW_ITEMS)
}

pub fn format_arg_value_with(value: &Value, max_chars: usize, max_items: usize) -> String {
    match value {
        Value::String(s) => truncate(s, max_chars),
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            let preview: Map<String, Value> = map
                .iter()
                .take(max_items)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let key_list = keys
                .iter()
                .take(max_items)
                .map(|k| format!("'{k}'"))
                .collect::<Vec<_>>()
                .join(", ");
            let suffix = if keys.len() > max_items { "..." } else { "" };
            truncate(
                &format!(
                    "dict(keys=[{key_list}]{suffix}, sample={})",
                    Value::Object(preview)
                ),
                max_chars,
            )
        }
        Value::Array(items) => {
            let preview: Vec<Value> = items.iter().take(max_items).cloned().collect();
            let suffix = if items.len() > max_items { "..." } else { "" };
            truncate(
                &format!(
                    "list(len={}{suffix}, sample={})",
                    items.len(),
                    Value::Array(preview)
                ),
                max_chars,
            )
        }
        scalar => truncate(&scalar.to_string(), max_chars),
    }
}

/// Format every argument with [`format_arg_value`].
pub fn format_args(args: &Map<String, Value>) -> Details {
    args.iter()
        .map(|(key, value)| (key.clone(), Value::String(format_arg_value(value))))
        .collect()
}

fn detail_map<const N: usize>(pairs: [(&str, String); N]) -> Details {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v)))
        .collect()
}

fn preview_names(names: &[String]) -> String {
    let mut preview = names
        .iter()
        .take(LIST_PREVIEW_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > LIST_PREVIEW_LIMIT {
        preview.push_str(", ...");
    }
    preview
}

fn preview_lines(mut lines: Vec<String>, total: usize) -> String {
    lines.truncate(LIST_PREVIEW_LIMIT);
    if total > LIST_PREVIEW_LIMIT {
        lines.push(format!("... and {} more", total - LIST_PREVIEW_LIMIT));
    }
    lines.join("\n")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Details for a meta-tool call: a batch preview for `call_tools`, the
/// requested names for `get_tool_schema`.
pub fn meta_call_details(tool_name: &str, args: &Map<String, Value>) -> Option<Details> {
    match tool_name.parse::<MetaTool>().ok()? {
        MetaTool::CallTools => {
            let calls = args.get("calls")?.as_array().filter(|c| !c.is_empty())?;
            let lines = calls
                .iter()
                .take(LIST_PREVIEW_LIMIT)
                .filter_map(Value::as_object)
                .map(|entry| {
                    let name = entry.get("tool_name").and_then(Value::as_str).unwrap_or("?");
                    match entry.get("arguments").and_then(Value::as_object) {
                        Some(params) if !params.is_empty() => {
                            let params = params
                                .iter()
                                .take(3)
                                .map(|(k, v)| match v {
                                    Value::String(s) => format!("{k}=\"{s}\""),
                                    other => format!("{k}={other}"),
                                })
                                .collect::<Vec<_>>()
                                .join(", ");
                            format!("{name}({params})")
                        }
                        _ => name.to_string(),
                    }
                })
                .collect();
            Some(detail_map([
                ("Tool count", calls.len().to_string()),
                ("Tools", preview_lines(lines, calls.len())),
            ]))
        }
        MetaTool::GetToolSchema => {
            let names: Vec<String> = args
                .get("tool_names")?
                .as_array()?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            (!names.is_empty()).then(|| detail_map([("Tools", preview_names(&names))]))
        }
        _ => None,
    }
}

/// Details summarizing what a discovery meta-tool returned, if recognizable.
pub fn discovery_result_details(tool_name: &str, content: &Value) -> Option<Details> {
    match tool_name.parse::<MetaTool>().ok()? {
        tool @ (MetaTool::ListTools | MetaTool::SearchTools) => {
            let (label, count_label) = if tool == MetaTool::SearchTools {
                ("Matches", "Match count")
            } else {
                ("Tools", "Tool count")
            };
            let entries = match content {
                Value::Object(map) => {
                    let mut entries: Vec<(String, String)> = map
                        .iter()
                        .map(|(name, desc)| {
                            let desc = to_text(desc).unwrap_or_default();
                            (name.clone(), normalize_whitespace(&desc))
                        })
                        .collect();
                    entries.sort();
                    entries
                }
                Value::String(text) => parse_listing(text),
                _ => return None,
            };
            Some(listing_details(&entries, label, count_label))
        }
        MetaTool::GetToolSchema => schema_result_details(content.as_str()?),
        MetaTool::CallTools => call_result_details(content),
    }
}

/// `- name: description` lines of a markdown listing.
fn parse_listing(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .filter_map(|body| {
            let (name, desc) = body.split_once(':').unwrap_or((body, ""));
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), desc.trim().to_string()))
        })
        .collect()
}

fn listing_details(entries: &[(String, String)], label: &str, count_label: &str) -> Details {
    if entries.is_empty() {
        return detail_map([(count_label, "0".into()), (label, "(none)".into())]);
    }
    let lines = entries
        .iter()
        .take(LIST_PREVIEW_LIMIT)
        .map(|(name, desc)| {
            if desc.is_empty() {
                name.clone()
            } else {
                format!("{name}: {desc}")
            }
        })
        .collect();
    detail_map([
        (count_label, entries.len().to_string()),
        (label, preview_lines(lines, entries.len())),
    ])
}

fn open_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_.-]*)>").expect("valid tag regex"))
}

fn named_tool_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<tool name="([^"]+)">\s*(.*?)\s*</tool>"#).expect("valid tool regex")
    })
}

/// `<name>{json}</name>` and `<tool name="...">{json}</tool>` blocks whose
/// payload is a JSON object.
fn parse_schema_blocks(content: &str) -> Vec<(String, Map<String, Value>)> {
    let mut blocks = Vec::new();

    let mut pos = 0;
    while let Some(caps) = open_tag_regex().captures_at(content, pos) {
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let closing = format!("</{}>", tag.as_str());
        match content[whole.end()..].find(&closing) {
            Some(offset) => {
                let body = &content[whole.end()..whole.end() + offset];
                if let Value::Object(payload) = parse_json(body.trim()) {
                    blocks.push((tag.as_str().to_string(), payload));
                }
                pos = whole.end() + offset + closing.len();
            }
            None => pos = whole.end(),
        }
    }

    for caps in named_tool_regex().captures_iter(content) {
        if let Value::Object(payload) = parse_json(&caps[2]) {
            blocks.push((caps[1].to_string(), payload));
        }
    }
    blocks
}

fn add_parameter_details(details: &mut Details, payload: &Map<String, Value>) {
    let Some(parameters) = payload.get("parameters").and_then(Value::as_object) else {
        return;
    };
    let names: Vec<String> = parameters
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    let required = parameters
        .get("required")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    details.insert("Parameter count".into(), names.len().to_string().into());
    details.insert("Required count".into(), required.to_string().into());
    if !names.is_empty() {
        details.insert("Parameters".into(), preview_names(&names).into());
    }
}

fn describe_payload(details: &mut Details, payload: &Map<String, Value>) {
    for key in ["group", "description"] {
        let Some(text) = payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            continue;
        };
        let (label, text) = match key {
            "group" => ("Group", text.to_string()),
            _ => ("Description", normalize_whitespace(text)),
        };
        details.insert(label.into(), text.into());
    }
    add_parameter_details(details, payload);
}

fn schema_overview(names: &[String], count: usize) -> Details {
    let mut out = detail_map([("Schema count", count.to_string())]);
    if !names.is_empty() {
        out.insert("Tools".into(), preview_names(names).into());
    }
    out
}

fn schema_result_details(content: &str) -> Option<Details> {
    let blocks = parse_schema_blocks(content);
    if let [(name, payload)] = blocks.as_slice() {
        let mut out = detail_map([("Name", name.clone())]);
        describe_payload(&mut out, payload);
        return Some(out);
    }
    if !blocks.is_empty() {
        let names: Vec<String> = blocks.iter().map(|(name, _)| name.clone()).collect();
        return Some(schema_overview(&names, blocks.len()));
    }

    let Value::Object(payload) = parse_json(content) else {
        return None;
    };
    if let Some(tools) = payload.get("tools").and_then(Value::as_array) {
        let tools: Vec<&Map<String, Value>> = tools.iter().filter_map(Value::as_object).collect();
        let names: Vec<String> = tools
            .iter()
            .filter_map(|tool| tool.get("name").and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        return Some(schema_overview(&names, tools.len()));
    }

    let mut out = Details::new();
    if let Some(name) = payload.get("name").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        out.insert("Name".into(), name.into());
    }
    describe_payload(&mut out, &payload);
    (!out.is_empty()).then_some(out)
}

fn call_result_details(content: &Value) -> Option<Details> {
    match content {
        Value::Array(entries) => {
            let results: Vec<&Map<String, Value>> = entries
                .iter()
                .filter_map(Value::as_object)
                .filter(|entry| entry.contains_key("tool_name"))
                .collect();
            if results.is_empty() {
                return None;
            }
            let lines = results
                .iter()
                .take(LIST_PREVIEW_LIMIT)
                .map(|entry| {
                    let name = entry.get("tool_name").and_then(Value::as_str).unwrap_or("?");
                    let result = entry.get("result").unwrap_or(&Value::Null);
                    let preview = format_arg_value_with(
                        result,
                        CONTENT_PREVIEW_MAX_CHARS,
                        MAX_ARG_PREVIEW_ITEMS,
                    );
                    format!("{name}: {preview}")
                })
                .collect();
            Some(detail_map([
                ("Result count", results.len().to_string()),
                ("Results", preview_lines(lines, results.len())),
            ]))
        }
        Value::String(text) => {
            let names: Vec<String> = text
                .lines()
                .filter_map(|line| line.trim().strip_prefix("## "))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            (!names.is_empty()).then(|| {
                detail_map([
                    ("Result count", names.len().to_string()),
                    ("Results", preview_names(&names)),
                ])
            })
        }
        _ => None,
    }
}

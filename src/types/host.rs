//! Inbound host protocol: conversation messages and the `extra_state` side channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::names::{
    GET_WIDGET_DATA, LOCAL_TOOL_CAPSULE_KEY, LOCAL_TOOL_REHYDRATED_KEY, LOCAL_TOOL_RESULT_KEY,
};

/// Speaker of a host message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    Human,
    Ai,
    Tool,
}

/// One message of host conversation history.
///
/// On the wire every message is a `role`-keyed object; function-call results
/// carry `function`, `input_arguments`, `data` and `extra_state` inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHostMessage", into = "RawHostMessage")]
pub enum HostMessage {
    UserText(String),
    AssistantText(String),
    AssistantFunctionCall(FunctionCall),
    FunctionCallResult(FunctionCallResult),
}

impl HostMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserText(text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantText(text.into())
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::FunctionCallResult(_))
    }
}

/// A function the assistant asked the host to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function: String,
    #[serde(default)]
    pub input_arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>, input_arguments: Value) -> Self {
        Self {
            function: function.into(),
            input_arguments: as_object(input_arguments),
        }
    }
}

/// Result of a host-executed function.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub function: String,
    #[serde(default)]
    pub input_arguments: Map<String, Value>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub extra_state: ExtraState,
}

impl FunctionCallResult {
    pub fn new(function: impl Into<String>, input_arguments: Value) -> Self {
        Self {
            function: function.into(),
            input_arguments: as_object(input_arguments),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_extra_state(mut self, extra_state: Value) -> Self {
        self.extra_state = ExtraState(as_object(extra_state));
        self
    }

    /// `data_sources` entries of a widget fetch, objects only.
    pub fn data_sources(&self) -> Vec<&Map<String, Value>> {
        data_sources(&self.input_arguments)
    }

    /// Arguments the widget was originally invoked with.
    pub fn widget_args(&self) -> Map<String, Value> {
        if self.function == GET_WIDGET_DATA {
            return self
                .data_sources()
                .first()
                .and_then(|source| source.get("input_args"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
        }
        self.input_arguments.clone()
    }

    /// Content handed to the model for a single (non-batched) result.
    pub fn serialized_content(&self) -> Value {
        let data: Vec<Value> = self.data.iter().map(strip_nulls).collect();
        let mut content = Map::new();
        content.insert(
            "input_arguments".into(),
            Value::Object(self.input_arguments.clone()),
        );
        content.insert("data".into(), Value::Array(data));
        if !self.extra_state.is_empty() {
            content.insert("extra_state".into(), Value::Object(self.extra_state.0.clone()));
        }
        Value::Object(content)
    }
}

/// Transport metadata attached to function calls and their results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraState(pub Map<String, Value>);

impl ExtraState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Raw `tool_calls` list, positions preserved.
    pub fn tool_call_entries(&self) -> &[Value] {
        self.0
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Well-formed `tool_calls` entries in order.
    pub fn tool_calls(&self) -> Vec<ToolCallRef> {
        self.tool_call_entries()
            .iter()
            .filter_map(ToolCallRef::from_value)
            .collect()
    }

    /// The single call id of a result: the direct field, then the first listed call.
    pub fn tool_call_id(&self) -> Option<&str> {
        if let Some(id) = self.0.get("tool_call_id").and_then(Value::as_str) {
            return Some(id);
        }
        self.tool_call_entries()
            .first()
            .and_then(|first| first.get("tool_call_id"))
            .and_then(Value::as_str)
    }

    pub fn capsule(&self) -> Option<&Value> {
        self.0.get(LOCAL_TOOL_CAPSULE_KEY)
    }

    pub fn is_rehydrated(&self) -> bool {
        self.0
            .get(LOCAL_TOOL_REHYDRATED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn rehydrated_result(&self) -> Option<&Value> {
        if !self.is_rehydrated() {
            return None;
        }
        self.0.get(LOCAL_TOOL_RESULT_KEY)
    }
}

/// One entry of `extra_state.tool_calls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl ToolCallRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;
        let tool_call_id = entry.get("tool_call_id")?.as_str()?.to_string();
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            tool_call_id,
            tool_name: text("tool_name"),
            widget_uuid: text("widget_uuid"),
            widget_id: text("widget_id"),
            server_id: text("server_id"),
        })
    }
}

pub(crate) fn data_sources(args: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    args.get("data_sources")
        .and_then(Value::as_array)
        .map(|sources| sources.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

pub(crate) fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

#[derive(Serialize, Deserialize)]
struct RawHostMessage {
    role: HostRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<RawContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_arguments: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_state: Option<ExtraState>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Call(FunctionCall),
}

impl TryFrom<RawHostMessage> for HostMessage {
    type Error = String;

    fn try_from(raw: RawHostMessage) -> Result<Self, Self::Error> {
        match (raw.role, raw.content) {
            (HostRole::Tool, _) => {
                let function = raw
                    .function
                    .ok_or_else(|| "tool message is missing `function`".to_string())?;
                Ok(Self::FunctionCallResult(FunctionCallResult {
                    function,
                    input_arguments: raw.input_arguments.unwrap_or_default(),
                    data: raw.data.unwrap_or_default(),
                    extra_state: raw.extra_state.unwrap_or_default(),
                }))
            }
            (HostRole::Human, Some(RawContent::Text(text))) => Ok(Self::UserText(text)),
            (HostRole::Ai, Some(RawContent::Text(text))) => Ok(Self::AssistantText(text)),
            (HostRole::Ai, Some(RawContent::Call(call))) => Ok(Self::AssistantFunctionCall(call)),
            (role, _) => Err(format!("unsupported content for role {role:?}")),
        }
    }
}

impl From<HostMessage> for RawHostMessage {
    fn from(message: HostMessage) -> Self {
        let base = |role, content| RawHostMessage {
            role,
            content,
            function: None,
            input_arguments: None,
            data: None,
            extra_state: None,
        };
        match message {
            HostMessage::UserText(text) => base(HostRole::Human, Some(RawContent::Text(text))),
            HostMessage::AssistantText(text) => base(HostRole::Ai, Some(RawContent::Text(text))),
            HostMessage::AssistantFunctionCall(call) => {
                base(HostRole::Ai, Some(RawContent::Call(call)))
            }
            HostMessage::FunctionCallResult(result) => RawHostMessage {
                role: HostRole::Tool,
                content: None,
                function: Some(result.function),
                input_arguments: Some(result.input_arguments),
                data: Some(result.data),
                extra_state: Some(result.extra_state),
            },
        }
    }
}

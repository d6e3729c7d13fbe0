//! Agent runtime vocabulary: message parts, history, and lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::HostEvent;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub tool_name: String,
    pub tool_call_id: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallPart {
    pub fn new(tool_name: impl Into<String>, tool_call_id: impl Into<String>, args: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            args,
        }
    }

    /// Arguments as an object; JSON-encoded strings are decoded.
    pub fn args_object(&self) -> Map<String, Value> {
        crate::util::json::normalize_args(&self.args)
    }
}

/// A tool result as recorded in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReturnPart {
    pub tool_name: String,
    pub tool_call_id: String,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "snake_case")]
pub enum MessagePart {
    UserPrompt { content: String },
    Text { content: String },
    ToolCall(ToolCallPart),
    ToolReturn(ToolReturnPart),
}

impl MessagePart {
    fn is_request_side(&self) -> bool {
        matches!(self, Self::UserPrompt { .. } | Self::ToolReturn(_))
    }
}

/// History entry: a request to the model or a response from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parts", rename_all = "snake_case")]
pub enum RuntimeMessage {
    Request(Vec<MessagePart>),
    Response(Vec<MessagePart>),
}

impl RuntimeMessage {
    pub fn parts(&self) -> &[MessagePart] {
        match self {
            Self::Request(parts) | Self::Response(parts) => parts,
        }
    }
}

/// Groups parts into alternating request/response messages.
#[derive(Debug, Default)]
pub struct MessagesBuilder {
    messages: Vec<RuntimeMessage>,
}

impl MessagesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, part: MessagePart) {
        let request_side = part.is_request_side();
        match (self.messages.last_mut(), request_side) {
            (Some(RuntimeMessage::Request(parts)), true)
            | (Some(RuntimeMessage::Response(parts)), false) => parts.push(part),
            (_, true) => self.messages.push(RuntimeMessage::Request(vec![part])),
            (_, false) => self.messages.push(RuntimeMessage::Response(vec![part])),
        }
    }

    pub fn build(self) -> Vec<RuntimeMessage> {
        self.messages
    }
}

/// Tool calls the agent hands to the host instead of running them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeferredToolRequests {
    pub calls: Vec<ToolCallPart>,
}

/// Content of a tool return as produced by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    Value(Value),
    Deferred(DeferredToolRequests),
    /// A tool that already rendered a host event.
    Event(HostEvent),
}

impl ToolOutput {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResultPart {
    Return {
        tool_name: String,
        tool_call_id: String,
        content: ToolOutput,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    /// Validation failure or explicit retry request sent back to the model.
    RetryPrompt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        tool_call_id: String,
        content: Value,
    },
}

impl ToolResultPart {
    pub fn returned(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<ToolOutput>,
    ) -> Self {
        Self::Return {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, value: Value) -> Self {
        if let Self::Return { metadata, .. } = &mut self {
            *metadata = Some(value);
        }
        self
    }
}

/// Final output of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RunOutput {
    Deferred(DeferredToolRequests),
    Value(Value),
}

/// Lifecycle events emitted by the agent runtime while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    TextStart { content: String },
    TextDelta { delta: String },
    ThinkingStart { content: String },
    ThinkingDelta { delta: String },
    ThinkingEnd { content: String },
    FunctionToolCall { part: ToolCallPart },
    FunctionToolResult { result: ToolResultPart },
    RunResult { output: RunOutput },
}

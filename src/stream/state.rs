//! Per-request bookkeeping for the event stream.

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value};

use crate::capsule::LocalToolEntry;
use crate::types::{Citation, ClientArtifact, RemoteTool, Widget};

/// What was known about a call when it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallInfo {
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub widget: Option<Widget>,
    pub remote_tool: Option<RemoteTool>,
}

impl ToolCallInfo {
    pub fn new(tool_name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            widget: None,
            remote_tool: None,
        }
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn with_remote_tool(mut self, tool: RemoteTool) -> Self {
        self.remote_tool = Some(tool);
        self
    }
}

#[derive(Debug)]
struct LocalCall {
    tool_call_id: String,
    tool_name: String,
    args: Map<String, Value>,
    result: Option<Value>,
}

/// Mutable state of one stream. Created per request, dropped at the end.
#[derive(Debug, Default)]
pub struct StreamState {
    thinking: Vec<String>,
    citations: VecDeque<Citation>,
    artifacts: VecDeque<ClientArtifact>,
    tool_calls: HashMap<String, ToolCallInfo>,
    local_calls: Vec<LocalCall>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_thinking(&mut self, content: impl Into<String>) {
        self.thinking.push(content.into());
    }

    pub fn thinking(&self) -> String {
        self.thinking.concat()
    }

    pub fn has_thinking(&self) -> bool {
        !self.thinking.is_empty()
    }

    pub fn clear_thinking(&mut self) {
        self.thinking.clear();
    }

    pub fn add_citation(&mut self, citation: Citation) {
        self.citations.push_back(citation);
    }

    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }

    pub fn drain_citations(&mut self) -> Vec<Citation> {
        self.citations.drain(..).collect()
    }

    pub fn queue_artifact(&mut self, artifact: ClientArtifact) {
        self.artifacts.push_back(artifact);
    }

    pub fn next_artifact(&mut self) -> Option<ClientArtifact> {
        self.artifacts.pop_front()
    }

    pub fn has_queued_artifacts(&self) -> bool {
        !self.artifacts.is_empty()
    }

    pub fn register_tool_call(&mut self, tool_call_id: impl Into<String>, info: ToolCallInfo) {
        self.tool_calls.insert(tool_call_id.into(), info);
    }

    pub fn has_tool_call(&self, tool_call_id: &str) -> bool {
        self.tool_calls.contains_key(tool_call_id)
    }

    pub fn peek_tool_call(&self, tool_call_id: &str) -> Option<&ToolCallInfo> {
        self.tool_calls.get(tool_call_id)
    }

    /// Remove and return the call info; a second lookup for the same id yields `None`.
    pub fn take_tool_call(&mut self, tool_call_id: &str) -> Option<ToolCallInfo> {
        self.tool_calls.remove(tool_call_id)
    }

    /// Track a directly executed call so it can be carried in the next capsule.
    pub fn register_local_call(
        &mut self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Map<String, Value>,
    ) {
        let tool_call_id = tool_call_id.into();
        if self.local_calls.iter().any(|c| c.tool_call_id == tool_call_id) {
            return;
        }
        self.local_calls.push(LocalCall {
            tool_call_id,
            tool_name: tool_name.into(),
            args,
            result: None,
        });
    }

    /// Record the result half. Unknown or already completed ids are ignored.
    pub fn complete_local_call(&mut self, tool_call_id: &str, result: Value) -> bool {
        match self
            .local_calls
            .iter_mut()
            .find(|c| c.tool_call_id == tool_call_id && c.result.is_none())
        {
            Some(call) => {
                call.result = Some(result);
                true
            }
            None => false,
        }
    }

    /// Remove and return every call that has both halves, in call order.
    pub fn take_completed_local_calls(&mut self) -> Vec<LocalToolEntry> {
        let (completed, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.local_calls)
            .into_iter()
            .partition(|c| c.result.is_some());
        self.local_calls = pending;
        completed
            .into_iter()
            .map(|c| LocalToolEntry {
                tool_call_id: c.tool_call_id,
                tool_name: c.tool_name,
                args: c.args,
                result: c.result.unwrap_or(Value::Null),
            })
            .collect()
    }
}

//! Event stream engine: agent runtime lifecycle events in, host events out.
//!
//! One engine serves one request. It consumes events sequentially and keeps
//! all of its state (pending calls, queued artifacts, citations, thinking
//! buffer) in a [`StreamState`] that is dropped with it.

pub mod content;
mod deferred;
pub mod format;
mod replay;

use std::fmt::Display;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::names::{CHART_TOOL, GET_WIDGET_DATA, HTML_TOOL, TABLE_TOOL, THINKING_LABEL};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::registry::{RemoteToolRegistry, WidgetRegistry};
use crate::stream::{StreamParser, StreamState, ToolCallInfo};
use crate::tools::discovery::{MetaTool, ToolCallSpec};
use crate::types::{
    Citation, ClientArtifact, FunctionCallResult, HostEvent, ReasoningStep, RunOutput,
    RuntimeEvent, StepLevel, ToolCallPart, ToolOutput, ToolResultPart, Widget,
};
use crate::util::json::to_text;

use content::{artifact_from_output, is_truthy, tool_result_events, WidgetEntry};
use format::{discovery_result_details, format_arg_value, format_args, meta_call_details};

/// Converts runtime lifecycle events into host protocol events.
#[derive(Debug)]
pub struct EventStreamEngine {
    widgets: Arc<WidgetRegistry>,
    remote_tools: Arc<RemoteToolRegistry>,
    pending_results: Vec<FunctionCallResult>,
    capsule_enabled: bool,
    state: StreamState,
    parser: StreamParser,
    has_streamed_text: bool,
    replayed: bool,
    final_output: Option<String>,
}

impl EventStreamEngine {
    pub fn new(
        widgets: Arc<WidgetRegistry>,
        remote_tools: Arc<RemoteToolRegistry>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            widgets,
            remote_tools,
            pending_results: Vec::new(),
            capsule_enabled: config.enable_local_tool_capsule,
            state: StreamState::new(),
            parser: StreamParser::new(config.placeholder_tokens.clone()),
            has_streamed_text: false,
            replayed: false,
            final_output: None,
        }
    }

    /// Host results to replay before the first runtime event.
    pub fn with_pending_results(mut self, pending: Vec<FunctionCallResult>) -> Self {
        self.pending_results = pending;
        self
    }

    pub fn has_streamed_text(&self) -> bool {
        self.has_streamed_text
    }

    /// Replay pending host results. Runs once; later calls yield nothing.
    pub fn before_stream(&mut self) -> Vec<HostEvent> {
        if self.replayed {
            return Vec::new();
        }
        self.replayed = true;

        let pending = std::mem::take(&mut self.pending_results);
        let events: Vec<HostEvent> = pending
            .iter()
            .flat_map(|result| self.replay_result(result))
            .collect();
        self.note_text(&events);
        events
    }

    /// Handle one runtime event.
    pub fn handle(&mut self, event: RuntimeEvent) -> Vec<HostEvent> {
        let events = match event {
            RuntimeEvent::TextStart { content } => self.text_events(&content),
            RuntimeEvent::TextDelta { delta } => self.text_events(&delta),
            RuntimeEvent::ThinkingStart { content } => {
                self.state.clear_thinking();
                if !content.is_empty() {
                    self.state.add_thinking(content);
                }
                Vec::new()
            }
            RuntimeEvent::ThinkingDelta { delta } => {
                if !delta.is_empty() {
                    self.state.add_thinking(delta);
                }
                Vec::new()
            }
            RuntimeEvent::ThinkingEnd { content } => self.thinking_end(content),
            RuntimeEvent::FunctionToolCall { part } => self.on_tool_call(part),
            RuntimeEvent::FunctionToolResult { result } => self.on_tool_result(result),
            RuntimeEvent::RunResult { output } => self.on_run_result(output),
        };
        self.note_text(&events);
        events
    }

    /// Convert a runtime failure into one ERROR step.
    pub fn on_error(&mut self, error: &dyn Display) -> Vec<HostEvent> {
        vec![HostEvent::error(error.to_string())]
    }

    /// End-of-stream flush: leftover thinking, buffered text, queued
    /// artifacts, citations, then the final output if nothing was streamed.
    pub fn finish(&mut self) -> Vec<HostEvent> {
        let mut events = Vec::new();

        if self.state.has_thinking() {
            let content = self.state.thinking();
            if !content.is_empty() {
                events.push(HostEvent::info(content));
            }
            self.state.clear_thinking();
        }

        if self.has_streamed_text || self.final_output.is_none() {
            events.extend(self.parser.flush());
        }
        while let Some(artifact) = self.state.next_artifact() {
            events.push(HostEvent::Artifact(artifact));
        }
        if self.state.has_citations() {
            events.push(HostEvent::CitationCollection {
                citations: self.state.drain_citations(),
            });
        }
        self.note_text(&events);

        if let Some(output) = self.final_output.take() {
            if !self.has_streamed_text {
                let mut tail = self.text_events(&output);
                tail.extend(self.parser.flush());
                self.note_text(&tail);
                events.extend(tail);
            }
        }
        events
    }

    /// Drive the engine over a runtime event stream.
    ///
    /// Pending results are replayed first. An upstream error becomes one
    /// ERROR step and ends the stream; cancellation ends it without any
    /// terminal event.
    pub fn run<S>(mut self, events: S, cancel: CancellationToken) -> BoxStream<'static, HostEvent>
    where
        S: Stream<Item = Result<RuntimeEvent>> + Send + 'static,
    {
        let stream = async_stream::stream! {
            if cancel.is_cancelled() {
                return;
            }
            for event in self.before_stream() {
                yield event;
            }

            let mut inner = std::pin::pin!(events);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("event stream cancelled");
                        return;
                    }
                    next = inner.next() => next,
                };
                match next {
                    Some(Ok(event)) => {
                        for out in self.handle(event) {
                            yield out;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "runtime event stream failed");
                        for out in self.on_error(&e) {
                            yield out;
                        }
                        return;
                    }
                    None => break,
                }
            }

            for event in self.finish() {
                yield event;
            }
        };
        Box::pin(stream)
    }

    fn note_text(&mut self, events: &[HostEvent]) {
        if events.iter().any(HostEvent::is_text) {
            self.has_streamed_text = true;
        }
    }

    fn text_events(&mut self, text: &str) -> Vec<HostEvent> {
        if text.is_empty() && !self.parser.has_pending_placeholder() {
            return Vec::new();
        }
        let state = &mut self.state;
        self.parser.parse(text, || state.next_artifact())
    }

    fn release_placeholder(&mut self) -> Vec<HostEvent> {
        if !self.parser.has_pending_placeholder() {
            return Vec::new();
        }
        self.text_events("")
    }

    fn thinking_end(&mut self, content: String) -> Vec<HostEvent> {
        let content = if content.is_empty() {
            self.state.thinking()
        } else {
            content
        };
        self.state.clear_thinking();
        if content.is_empty() {
            return Vec::new();
        }
        let mut details = Map::new();
        details.insert(THINKING_LABEL.into(), Value::String(content));
        vec![HostEvent::step(
            ReasoningStep::new(StepLevel::Info, THINKING_LABEL).with_details(details),
        )]
    }

    fn on_run_result(&mut self, output: RunOutput) -> Vec<HostEvent> {
        match output {
            RunOutput::Deferred(requests) => self.expand_deferred(requests.calls),
            RunOutput::Value(value) => {
                if let Some(artifact) = artifact_from_output(&value) {
                    return vec![HostEvent::Artifact(artifact)];
                }
                if let Value::String(text) = value {
                    if !text.is_empty() && !self.has_streamed_text {
                        self.final_output = Some(text);
                    }
                }
                Vec::new()
            }
        }
    }

    fn on_tool_call(&mut self, part: ToolCallPart) -> Vec<HostEvent> {
        let raw_args = part.args_object();
        let (name, args) = unwrap_single_call(&part.tool_name, &raw_args)
            .unwrap_or_else(|| (part.tool_name.clone(), raw_args.clone()));

        if name == GET_WIDGET_DATA || self.widgets.find_by_tool_name(&name).is_some() {
            return Vec::new();
        }
        let tool_call_id = part.tool_call_id.as_str();
        if tool_call_id.is_empty() || self.state.has_tool_call(tool_call_id) {
            return Vec::new();
        }

        tracing::debug!(tool = %name, tool_call_id, "tool call");
        self.state
            .register_tool_call(tool_call_id, ToolCallInfo::new(&name, args.clone()));
        self.state
            .register_local_call(tool_call_id, &part.tool_name, raw_args);

        let details = meta_call_details(&name, &args).unwrap_or_else(|| format_args(&args));
        vec![HostEvent::step(
            ReasoningStep::new(StepLevel::Info, format!("Calling tool '{name}'"))
                .with_details(details),
        )]
    }

    fn on_tool_result(&mut self, result: ToolResultPart) -> Vec<HostEvent> {
        let (tool_name, tool_call_id, content, metadata) = match result {
            ToolResultPart::RetryPrompt { content, .. } => {
                if !is_truthy(&content) {
                    return Vec::new();
                }
                let message = match content {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                return vec![HostEvent::error(message)];
            }
            ToolResultPart::Return {
                tool_name,
                tool_call_id,
                content,
                metadata,
            } => (tool_name, tool_call_id, content, metadata),
        };
        if tool_call_id.is_empty() {
            return Vec::new();
        }

        if let Some(value) = content.as_value() {
            self.state.complete_local_call(&tool_call_id, value.clone());
        }

        let effective_name = self
            .state
            .peek_tool_call(&tool_call_id)
            .map_or(tool_name.as_str(), |info| info.tool_name.as_str())
            .to_string();
        if let Some(key) = viz_metadata_key(&effective_name) {
            if let Some(events) =
                self.queue_viz_artifact(&tool_call_id, key, &content, metadata.as_ref())
            {
                return events;
            }
        }

        self.collect_metadata_citations(metadata.as_ref());

        let value = match content {
            ToolOutput::Event(event) => return vec![event],
            ToolOutput::Deferred(requests) => return self.expand_deferred(requests.calls),
            ToolOutput::Value(value) => value,
        };

        let Some(info) = self.state.take_tool_call(&tool_call_id) else {
            return Vec::new();
        };
        match info.widget.clone() {
            Some(widget) => {
                self.state.add_citation(widget_citation(&widget, &info.args));
                let entries = vec![(Some(widget), info.args.clone())];
                widget_result_events(&info, &value, &entries)
            }
            None => generic_result_events(&info, &value),
        }
    }

    /// Queue a visualization artifact from metadata or content. `None` when
    /// the result carried no artifact and should be handled normally.
    fn queue_viz_artifact(
        &mut self,
        tool_call_id: &str,
        key: &str,
        content: &ToolOutput,
        metadata: Option<&Value>,
    ) -> Option<Vec<HostEvent>> {
        let mut events = Vec::new();

        let from_metadata = metadata.and_then(|m| m.get(key)).and_then(|raw| {
            serde_json::from_value::<ClientArtifact>(raw.clone())
                .map_err(|e| tracing::debug!(error = %e, key, "ignoring malformed artifact metadata"))
                .ok()
        });
        let queued = from_metadata.is_some();
        if let Some(artifact) = from_metadata {
            self.state.queue_artifact(artifact);
            events.extend(self.release_placeholder());
        }

        if let ToolOutput::Event(HostEvent::Artifact(artifact)) = content {
            self.state.queue_artifact(artifact.clone());
            events.extend(self.release_placeholder());
        } else if !queued {
            return None;
        }

        self.state.take_tool_call(tool_call_id);
        self.note_text(&events);
        Some(events)
    }

    fn collect_metadata_citations(&mut self, metadata: Option<&Value>) {
        let Some(raw) = metadata.and_then(|m| m.get("citations")) else {
            return;
        };
        let items: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items.into_iter().filter(|item| item.is_object()) {
            match serde_json::from_value::<Citation>(item.clone()) {
                Ok(citation) => self.state.add_citation(citation),
                Err(e) => tracing::debug!(error = %e, "skipping unparsable citation in tool metadata"),
            }
        }
    }
}

fn viz_metadata_key(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        CHART_TOOL => Some("chart"),
        TABLE_TOOL => Some("table"),
        HTML_TOOL => Some("html"),
        _ => None,
    }
}

/// Target of a `call_tools` call that wraps exactly one nested call.
fn unwrap_single_call(
    tool_name: &str,
    args: &Map<String, Value>,
) -> Option<(String, Map<String, Value>)> {
    if tool_name != MetaTool::CallTools.as_ref() {
        return None;
    }
    let mut specs = ToolCallSpec::parse_batch(args.get("calls")?).ok()?;
    if specs.len() != 1 {
        return None;
    }
    let spec = specs.pop()?;
    Some((spec.tool_name, spec.arguments))
}

fn widget_citation(widget: &Widget, args: &Map<String, Value>) -> Citation {
    Citation::for_widget(widget, args, format_args(args))
}

fn widget_result_events(
    info: &ToolCallInfo,
    content: &Value,
    entries: &[WidgetEntry],
) -> Vec<HostEvent> {
    let events = tool_result_events(content, entries);
    if !events.is_empty() {
        return events;
    }
    generic_result_events(info, content)
}

/// Fallback rendering of a non-widget tool result.
fn generic_result_events(info: &ToolCallInfo, content: &Value) -> Vec<HostEvent> {
    let returned = format!("Tool '{}' returned", info.tool_name);

    if let Some(details) = discovery_result_details(&info.tool_name, content) {
        return vec![HostEvent::step(
            ReasoningStep::new(StepLevel::Info, returned).with_details(details),
        )];
    }

    let mut events = tool_result_events(content, &[]);
    if !events.is_empty() {
        events.insert(0, HostEvent::info(returned));
        return events;
    }

    if let Some(artifact) = artifact_from_output(content) {
        return vec![HostEvent::step(
            ReasoningStep::new(StepLevel::Info, returned).with_artifacts(vec![artifact]),
        )];
    }

    let mut details = format_args(&info.args);
    if to_text(content).is_some_and(|text| !text.is_empty()) {
        details.insert("Result".into(), Value::String(format_arg_value(content)));
    }
    vec![HostEvent::step(
        ReasoningStep::new(StepLevel::Info, returned).with_details(details),
    )]
}

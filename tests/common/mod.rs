//! Shared test fixtures: a small dashboard and engine drivers.
#![allow(dead_code)]

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use hostbridge::prelude::*;
use hostbridge::types::{FunctionCallEvent, MessagePart, ToolCallPart};

pub const QUOTE_UUID: &str = "0b7c1a52-quote";
pub const NEWS_UUID: &str = "5f2e9d10-news";

pub fn quote_widget() -> Widget {
    Widget::new(QUOTE_UUID, "OpenBB", "stock_quote", "Stock Quote")
        .with_description("Latest price for a ticker")
}

pub fn news_widget() -> Widget {
    Widget::new(NEWS_UUID, "OpenBB Sandbox", "company_news", "Company News")
}

pub fn dashboard() -> WidgetCollection {
    WidgetCollection {
        primary: vec![quote_widget()],
        secondary: vec![news_widget()],
        extra: Vec::new(),
    }
}

pub fn remote_tools() -> Vec<RemoteTool> {
    let mut search = RemoteTool::new("web_search", "search-server");
    search.description = Some("Search the web".into());
    search.endpoint = Some("/tools/web_search".into());
    vec![search]
}

pub fn engine(config: &BridgeConfig) -> EventStreamEngine {
    let widgets = WidgetRegistry::from_collection(&dashboard());
    let remote: RemoteToolRegistry = remote_tools().into_iter().collect();
    EventStreamEngine::new(Arc::new(widgets), Arc::new(remote), config)
}

/// Run `events` through `engine` to completion.
pub async fn drive(engine: EventStreamEngine, events: Vec<RuntimeEvent>) -> Vec<HostEvent> {
    let input = futures::stream::iter(events.into_iter().map(Ok));
    engine.run(input, CancellationToken::new()).collect().await
}

pub fn call(name: &str, id: &str, args: Value) -> RuntimeEvent {
    RuntimeEvent::FunctionToolCall {
        part: ToolCallPart::new(name, id, args),
    }
}

pub fn text(delta: &str) -> RuntimeEvent {
    RuntimeEvent::TextDelta {
        delta: delta.to_string(),
    }
}

/// A `get_widget_data` result for one widget, as the host sends it.
pub fn widget_result(widget: &Widget, tool_call_id: &str, args: Value, content: &str) -> FunctionCallResult {
    FunctionCallResult::new(
        "get_widget_data",
        json!({"data_sources": [widget.data_source(args.as_object().cloned().unwrap_or_default())]}),
    )
    .with_data(vec![json!({"items": [{"content": content}]})])
    .with_extra_state(json!({
        "tool_calls": [{
            "tool_call_id": tool_call_id,
            "widget_uuid": widget.uuid,
            "widget_id": widget.widget_id,
            "tool_name": widget.tool_name(),
        }]
    }))
}

pub fn steps(events: &[HostEvent]) -> Vec<&ReasoningStep> {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::ReasoningStep(step) => Some(step),
            _ => None,
        })
        .collect()
}

pub fn dispatches(events: &[HostEvent]) -> Vec<&FunctionCallEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::FunctionCall(call) => Some(call),
            _ => None,
        })
        .collect()
}

pub fn streamed_text(events: &[HostEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::TextChunk { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

/// Event names in order, e.g. `["reasoning_step", "function_call"]`.
pub fn names(events: &[HostEvent]) -> Vec<&'static str> {
    events.iter().map(HostEvent::name).collect()
}

pub fn parts(messages: &[RuntimeMessage]) -> Vec<&MessagePart> {
    messages.iter().flat_map(|m| m.parts()).collect()
}

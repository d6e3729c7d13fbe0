//! Deferred tool requests -> host function-call dispatches.

use serde_json::{json, Map, Value};

use super::format::format_args;
use super::EventStreamEngine;
use crate::capsule::{fingerprint, pack_tool_history};
use crate::config::names::{EXECUTE_AGENT_TOOL, GET_WIDGET_DATA, LOCAL_TOOL_CAPSULE_KEY};
use crate::stream::ToolCallInfo;
use crate::tools::discovery::{MetaTool, ToolCallSpec};
use crate::types::{
    ExtraState, FunctionCallEvent, HostEvent, ReasoningStep, RemoteTool, StepLevel, ToolCallPart,
    Widget,
};

impl EventStreamEngine {
    /// Expand deferred calls into request steps followed by host dispatches.
    ///
    /// All widget calls share one `get_widget_data` dispatch, which goes
    /// first; every remote tool call gets its own `execute_agent_tool`.
    pub(super) fn expand_deferred(&mut self, calls: Vec<ToolCallPart>) -> Vec<HostEvent> {
        let mut steps = Vec::new();
        let mut data_sources = Vec::new();
        let mut widget_refs = Vec::new();
        let mut dispatches = Vec::new();

        for call in flatten_call_tools(calls) {
            let args = call.args_object();

            if let Some(widget) = self.widgets.find_by_tool_name(&call.tool_name).cloned() {
                let args = widget_arguments(args);
                steps.push(widget_request_step(&widget, &args));
                widget_refs.push(json!({
                    "tool_call_id": call.tool_call_id,
                    "widget_uuid": widget.uuid,
                    "widget_id": widget.widget_id,
                    "tool_name": call.tool_name,
                }));
                data_sources.push(widget.data_source(args.clone()));
                self.state.register_tool_call(
                    call.tool_call_id,
                    ToolCallInfo::new(&call.tool_name, args).with_widget(widget),
                );
                continue;
            }

            if let Some(tool) = self.remote_tools.find(&call.tool_name).cloned() {
                let args = remote_arguments(args);
                dispatches.push(remote_dispatch(&tool, &call.tool_call_id, &args));
                self.state.register_tool_call(
                    call.tool_call_id,
                    ToolCallInfo::new(&call.tool_name, args).with_remote_tool(tool),
                );
                continue;
            }

            tracing::warn!(
                tool = %call.tool_name,
                tool_call_id = %call.tool_call_id,
                "deferred call for unknown tool, skipping"
            );
        }

        if !data_sources.is_empty() {
            let mut input_arguments = Map::new();
            input_arguments.insert("data_sources".into(), Value::Array(data_sources));
            let mut extra_state = ExtraState::new();
            extra_state.insert("tool_calls", Value::Array(widget_refs));
            dispatches.insert(
                0,
                FunctionCallEvent {
                    function: GET_WIDGET_DATA.to_string(),
                    input_arguments,
                    extra_state,
                },
            );
        }

        self.attach_capsule(&mut dispatches);

        steps
            .into_iter()
            .chain(dispatches.into_iter().map(HostEvent::FunctionCall))
            .collect()
    }

    fn attach_capsule(&mut self, dispatches: &mut [FunctionCallEvent]) {
        if !self.capsule_enabled {
            return;
        }
        let Some(first) = dispatches.first_mut() else {
            return;
        };
        let entries = self.state.take_completed_local_calls();
        if entries.is_empty() {
            return;
        }
        match pack_tool_history(&entries) {
            Ok(packed) => {
                tracing::debug!(
                    entries = entries.len(),
                    fingerprint = %fingerprint(&packed),
                    "attaching local tool capsule"
                );
                first
                    .extra_state
                    .insert(LOCAL_TOOL_CAPSULE_KEY, Value::String(packed));
            }
            Err(e) => tracing::warn!(error = %e, "failed to pack local tool history"),
        }
    }
}

/// Replace `call_tools` wrappers with their nested calls.
///
/// Several nested calls get `{parent}-{i}`. A lone nested call keeps the
/// wrapper id unchanged, so the host result for it re-associates with the
/// `call_tools` call the model made.
fn flatten_call_tools(calls: Vec<ToolCallPart>) -> Vec<ToolCallPart> {
    let mut flat = Vec::with_capacity(calls.len());
    for call in calls {
        if call.tool_name != MetaTool::CallTools.as_ref() {
            flat.push(call);
            continue;
        }
        let specs = call
            .args
            .get("calls")
            .ok_or_else(|| "missing 'calls'".to_string())
            .and_then(|raw| ToolCallSpec::parse_batch(raw).map_err(|e| e.to_string()));
        let specs = match specs {
            Ok(specs) => specs,
            Err(e) => {
                tracing::warn!(tool_call_id = %call.tool_call_id, error = %e, "skipping malformed call_tools request");
                continue;
            }
        };
        let single = specs.len() == 1;
        for (i, spec) in specs.into_iter().enumerate() {
            let id = if single {
                call.tool_call_id.clone()
            } else {
                format!("{}-{i}", call.tool_call_id)
            };
            flat.push(ToolCallPart::new(
                spec.tool_name,
                id,
                Value::Object(spec.arguments),
            ));
        }
    }
    flat
}

/// Widget arguments out of a `get_widget_data` fetch envelope or a lone
/// `{"input_args": {...}}` wrapper; plain arguments pass through.
fn widget_arguments(mut args: Map<String, Value>) -> Map<String, Value> {
    let fetched = args
        .get("data_sources")
        .and_then(Value::as_array)
        .and_then(|sources| sources.first())
        .and_then(|source| source.get("input_args"))
        .and_then(Value::as_object);
    if let Some(inner) = fetched {
        return inner.clone();
    }
    if args.len() == 1 && args.get("input_args").is_some_and(Value::is_object) {
        if let Some(Value::Object(inner)) = args.remove("input_args") {
            return inner;
        }
    }
    args
}

/// Remote tool arguments out of an `execute_agent_tool` dispatch envelope.
fn remote_arguments(mut args: Map<String, Value>) -> Map<String, Value> {
    if args.get("parameters").is_some_and(Value::is_object) {
        if let Some(Value::Object(inner)) = args.remove("parameters") {
            return inner;
        }
    }
    args
}

fn widget_request_step(widget: &Widget, args: &Map<String, Value>) -> HostEvent {
    let mut details = Map::new();
    details.insert("Origin".into(), Value::String(widget.origin.clone()));
    details.insert("Widget Id".into(), Value::String(widget.widget_id.clone()));
    details.extend(format_args(args));
    HostEvent::step(
        ReasoningStep::new(StepLevel::Info, format!("Requesting widget '{}'", widget.name))
            .with_details(details),
    )
}

fn remote_dispatch(tool: &RemoteTool, tool_call_id: &str, args: &Map<String, Value>) -> FunctionCallEvent {
    let server_id = tool.server_identifier().map(str::to_string);

    let mut input_arguments = Map::new();
    input_arguments.insert("server_id".into(), json!(server_id));
    input_arguments.insert("tool_name".into(), Value::String(tool.name.clone()));
    input_arguments.insert("parameters".into(), Value::Object(args.clone()));
    if let Some(endpoint) = &tool.endpoint {
        input_arguments.insert("endpoint".into(), Value::String(endpoint.clone()));
    }
    if let Some(url) = &tool.url {
        input_arguments.insert("url".into(), Value::String(url.clone()));
    }

    let mut extra_state = ExtraState::new();
    extra_state.insert(
        "tool_calls",
        json!([{
            "tool_call_id": tool_call_id,
            "tool_name": tool.name,
            "server_id": server_id,
        }]),
    );

    FunctionCallEvent {
        function: EXECUTE_AGENT_TOOL.to_string(),
        input_arguments,
        extra_state,
    }
}

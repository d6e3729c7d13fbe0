//! Replay of host function-call results that arrived with the request.

use serde_json::Value;

use super::content::WidgetEntry;
use super::format::format_args;
use super::{generic_result_events, widget_citation, widget_result_events, EventStreamEngine};
use crate::config::names::{EXECUTE_AGENT_TOOL, GET_WIDGET_DATA};
use crate::stream::ToolCallInfo;
use crate::types::{as_object, FunctionCallResult, HostEvent, ReasoningStep, StepLevel};
use crate::util::json::normalize_args;

impl EventStreamEngine {
    pub(super) fn replay_result(&mut self, result: &FunctionCallResult) -> Vec<HostEvent> {
        let content = result.serialized_content();

        if result.function == EXECUTE_AGENT_TOOL {
            let tool_name = result
                .input_arguments
                .get("tool_name")
                .and_then(Value::as_str)
                .unwrap_or(EXECUTE_AGENT_TOOL);
            let args = result
                .input_arguments
                .get("parameters")
                .map(normalize_args)
                .unwrap_or_default();
            let mut info = ToolCallInfo::new(tool_name, args);
            if let Some(tool) = self.remote_tools.find(tool_name) {
                info = info.with_remote_tool(tool.clone());
            }
            return generic_result_events(&info, &content);
        }

        let entries = self.widget_entries(result);
        let mut events = Vec::new();
        for (i, (widget, args)) in entries.iter().enumerate() {
            match widget {
                Some(widget) => self.state.add_citation(widget_citation(widget, args)),
                None => {
                    let ordinal = if entries.len() > 1 {
                        format!(" #{}", i + 1)
                    } else {
                        String::new()
                    };
                    events.push(HostEvent::step(
                        ReasoningStep::new(
                            StepLevel::Warning,
                            format!(
                                "Received result{ordinal} for '{}' without widget metadata",
                                result.function
                            ),
                        )
                        .with_details(format_args(args)),
                    ));
                }
            }
        }

        let mut info = ToolCallInfo::new(&result.function, Default::default());
        if let [(widget, args)] = entries.as_slice() {
            info.args = args.clone();
            info.widget = widget.clone();
        }
        events.extend(widget_result_events(&info, &content, &entries));
        events
    }

    /// Widgets a result belongs to, one per fetched data source.
    fn widget_entries(&self, result: &FunctionCallResult) -> Vec<WidgetEntry> {
        if result.function == GET_WIDGET_DATA {
            let sources = result.data_sources();
            if !sources.is_empty() {
                return sources
                    .into_iter()
                    .map(|source| {
                        let widget = source
                            .get("widget_uuid")
                            .and_then(Value::as_str)
                            .and_then(|uuid| self.widgets.find_by_uuid(uuid))
                            .cloned();
                        let args = source
                            .get("input_args")
                            .cloned()
                            .map(as_object)
                            .unwrap_or_default();
                        (widget, args)
                    })
                    .collect();
            }
        }
        vec![(
            self.widgets.find_for_result(result).cloned(),
            result.widget_args(),
        )]
    }
}

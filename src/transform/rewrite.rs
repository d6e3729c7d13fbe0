//! Progressive-discovery renaming of replayed host calls.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::names::{EXECUTE_AGENT_TOOL, GET_WIDGET_DATA};
use crate::tools::discovery::MetaTool;
use crate::types::{data_sources, HostMessage};

/// Call id -> name of the tool the model reached through `call_tools`.
#[derive(Debug, Default)]
pub(crate) struct ProgressiveRewriter {
    wrapped: HashMap<String, String>,
}

impl ProgressiveRewriter {
    pub(crate) fn build(messages: &[HostMessage]) -> Self {
        let mut wrapped = HashMap::new();
        for message in messages {
            let HostMessage::FunctionCallResult(result) = message else {
                continue;
            };
            for call in result.extra_state.tool_calls() {
                if let Some(name) = call.tool_name {
                    wrapped.insert(call.tool_call_id, name);
                }
            }
        }
        Self { wrapped }
    }

    pub(crate) fn wrapped_name(&self, tool_call_id: &str) -> Option<&str> {
        self.wrapped.get(tool_call_id).map(String::as_str)
    }

    /// Re-express a host call as a single-entry `call_tools` invocation.
    pub(crate) fn rewrite_call(
        &self,
        tool_call_id: &str,
        function: &str,
        args: &Map<String, Value>,
    ) -> Option<(String, Value)> {
        let wrapped = self.wrapped_name(tool_call_id)?;
        let arguments = inner_arguments(function, args);
        Some((
            MetaTool::CallTools.to_string(),
            json!({"calls": [{"tool_name": wrapped, "arguments": arguments}]}),
        ))
    }

    pub(crate) fn rewrite_return_name(&self, tool_call_id: &str) -> Option<String> {
        self.wrapped_name(tool_call_id)
            .map(|_| MetaTool::CallTools.to_string())
    }
}

/// Strip the host dispatch envelope, leaving the arguments the model passed.
fn inner_arguments(function: &str, args: &Map<String, Value>) -> Value {
    match function {
        EXECUTE_AGENT_TOOL => match args.get("parameters") {
            Some(Value::Object(params)) => Value::Object(params.clone()),
            _ => json!({}),
        },
        GET_WIDGET_DATA => data_sources(args)
            .first()
            .and_then(|source| source.get("input_args"))
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| json!({})),
        _ => Value::Object(args.clone()),
    }
}

//! Replays local tool calls carried in capsules back into history.

use std::collections::{HashMap, HashSet};

use crate::capsule::{self, LocalToolEntry};
use crate::types::{FunctionCallResult, HostMessage, MessagePart, MessagesBuilder, ToolCallPart, ToolReturnPart};

/// Capsule entries keyed by the deferred call id they travelled with.
#[derive(Debug, Default)]
pub(crate) struct CapsuleIndex {
    capsules: Vec<Vec<LocalToolEntry>>,
    by_call_id: HashMap<String, usize>,
    rehydrated: HashSet<String>,
}

impl CapsuleIndex {
    pub(crate) fn build(messages: &[HostMessage]) -> Self {
        let mut index = Self::default();
        for message in messages {
            let HostMessage::FunctionCallResult(result) = message else {
                continue;
            };
            index.add(result);
        }
        index
    }

    fn add(&mut self, result: &FunctionCallResult) {
        let Some(raw) = result.extra_state.capsule() else {
            return;
        };
        let entries = match capsule::unpack_value(raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(function = %result.function, error = %e, "ignoring invalid tool history capsule");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        if let Some(packed) = raw.as_str() {
            tracing::debug!(
                capsule = %capsule::fingerprint(packed),
                entries = entries.len(),
                "rehydrating local tool history"
            );
        }

        let slot = self.capsules.len();
        self.capsules.push(entries);
        let mut ids: Vec<String> = result
            .extra_state
            .tool_calls()
            .into_iter()
            .map(|call| call.tool_call_id)
            .collect();
        if ids.is_empty() {
            ids.extend(result.extra_state.tool_call_id().map(str::to_string));
        }
        for id in ids {
            self.by_call_id.entry(id).or_insert(slot);
        }
    }

    /// Emit the local call/return pairs that precede `tool_call_id`, once each.
    pub(crate) fn inject_before(&mut self, tool_call_id: &str, builder: &mut MessagesBuilder) {
        let Some(&slot) = self.by_call_id.get(tool_call_id) else {
            return;
        };
        for entry in &self.capsules[slot] {
            if !self.rehydrated.insert(entry.tool_call_id.clone()) {
                continue;
            }
            builder.add(MessagePart::ToolCall(ToolCallPart::new(
                entry.tool_name.clone(),
                entry.tool_call_id.clone(),
                serde_json::Value::Object(entry.args.clone()),
            )));
            builder.add(MessagePart::ToolReturn(ToolReturnPart {
                tool_name: entry.tool_name.clone(),
                tool_call_id: entry.tool_call_id.clone(),
                content: Some(entry.result.clone()),
            }));
        }
    }
}

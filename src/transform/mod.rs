//! Host history -> agent runtime history.
//!
//! Host results carry their call ids in `extra_state`; host calls do not.
//! Ids are therefore collected from every result first and handed out to
//! calls in order, per function name.

mod rehydrate;
mod rewrite;

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::types::{
    data_sources, FunctionCall, FunctionCallResult, HostMessage, MessagePart, MessagesBuilder,
    RuntimeMessage, ToolCallPart, ToolReturnPart,
};

use rehydrate::CapsuleIndex;
use rewrite::ProgressiveRewriter;

/// Result of transforming one request's history.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub messages: Vec<RuntimeMessage>,
    /// Trailing results the host is returning for the current turn.
    pub pending: Vec<FunctionCallResult>,
}

/// Converts host history into runtime call/return history.
#[derive(Debug, Clone)]
pub struct MessageTransformer {
    progressive_rewrite: bool,
    rehydrate_capsules: bool,
}

impl Default for MessageTransformer {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl MessageTransformer {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            progressive_rewrite: config.enable_progressive_discovery,
            rehydrate_capsules: config.enable_local_tool_capsule,
        }
    }

    /// Transform history and split off the pending trailing results.
    pub fn transform(&self, messages: &[HostMessage]) -> Result<TransformOutput> {
        Ok(TransformOutput {
            messages: self.transform_batch(messages)?,
            pending: split_pending(messages),
        })
    }

    /// Transform history into runtime messages.
    ///
    /// Fails when a result carries no call id or when calls outnumber the
    /// ids the host declared; both would misattribute tool results.
    pub fn transform_batch(&self, messages: &[HostMessage]) -> Result<Vec<RuntimeMessage>> {
        let id_pool = build_id_pool(messages);
        let rewriter = if self.progressive_rewrite {
            ProgressiveRewriter::build(messages)
        } else {
            ProgressiveRewriter::default()
        };
        let mut capsules = if self.rehydrate_capsules {
            CapsuleIndex::build(messages)
        } else {
            CapsuleIndex::default()
        };
        let mut counters: HashMap<&str, usize> = HashMap::new();
        let mut builder = MessagesBuilder::new();

        for message in messages {
            match message {
                HostMessage::UserText(text) => builder.add(MessagePart::UserPrompt {
                    content: text.clone(),
                }),
                HostMessage::AssistantText(text) => builder.add(MessagePart::Text {
                    content: text.clone(),
                }),
                HostMessage::AssistantFunctionCall(call) => {
                    for part in resolve_calls(call, &id_pool, &mut counters)? {
                        capsules.inject_before(&part.tool_call_id, &mut builder);
                        builder.add(MessagePart::ToolCall(rewrite_call(&rewriter, part)));
                    }
                }
                HostMessage::FunctionCallResult(result) => {
                    for mut part in result_returns(result)? {
                        capsules.inject_before(&part.tool_call_id, &mut builder);
                        if let Some(name) = rewriter.rewrite_return_name(&part.tool_call_id) {
                            part.tool_name = name;
                        }
                        builder.add(MessagePart::ToolReturn(part));
                    }
                }
            }
        }
        Ok(builder.build())
    }
}

/// Results after the last non-result message.
pub fn split_pending(messages: &[HostMessage]) -> Vec<FunctionCallResult> {
    let mut pending: Vec<FunctionCallResult> = messages
        .iter()
        .rev()
        .map_while(|message| match message {
            HostMessage::FunctionCallResult(result) => Some(result.clone()),
            _ => None,
        })
        .collect();
    pending.reverse();
    pending
}

/// Function name -> every declared call id, in message order.
fn build_id_pool(messages: &[HostMessage]) -> HashMap<&str, Vec<String>> {
    let mut pool: HashMap<&str, Vec<String>> = HashMap::new();
    for message in messages {
        let HostMessage::FunctionCallResult(result) = message else {
            continue;
        };
        let mut ids: Vec<String> = result
            .extra_state
            .tool_calls()
            .into_iter()
            .map(|call| call.tool_call_id)
            .collect();
        if ids.is_empty() {
            ids.extend(result.extra_state.tool_call_id().map(str::to_string));
        }
        if !ids.is_empty() {
            pool.entry(result.function.as_str()).or_default().extend(ids);
        }
    }
    pool
}

/// One call part per data source (or one for the whole call), ids drawn in order.
fn resolve_calls<'a>(
    call: &'a FunctionCall,
    id_pool: &HashMap<&str, Vec<String>>,
    counters: &mut HashMap<&'a str, usize>,
) -> Result<Vec<ToolCallPart>> {
    let function = call.function.as_str();
    let ids = id_pool.get(function).map(Vec::as_slice).unwrap_or(&[]);
    let counter = counters.entry(function).or_insert(0);

    let sources = data_sources(&call.input_arguments);
    let args: Vec<Value> = if sources.len() > 1 {
        sources
            .into_iter()
            .map(|source| json!({"data_sources": [source]}))
            .collect()
    } else {
        vec![Value::Object(call.input_arguments.clone())]
    };

    let needed = *counter + args.len();
    if needed > ids.len() {
        return Err(BridgeError::InsufficientToolCallIds {
            function: function.to_string(),
            needed,
            available: ids.len(),
        });
    }

    let parts = args
        .into_iter()
        .enumerate()
        .map(|(i, args)| ToolCallPart::new(function, ids[*counter + i].clone(), args))
        .collect();
    *counter = needed;
    Ok(parts)
}

fn rewrite_call(rewriter: &ProgressiveRewriter, part: ToolCallPart) -> ToolCallPart {
    let args: Map<String, Value> = part.args_object();
    match rewriter.rewrite_call(&part.tool_call_id, &part.tool_name, &args) {
        Some((name, wrapped)) => ToolCallPart::new(name, part.tool_call_id, wrapped),
        None => part,
    }
}

/// Returns for one host result, unbundling batched results positionally.
fn result_returns(result: &FunctionCallResult) -> Result<Vec<ToolReturnPart>> {
    let entries = result.extra_state.tool_call_entries();
    if entries.len() > 1 {
        // Item i belongs to id i; the host declares no other correlation key.
        let returns = entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let id = entry.get("tool_call_id")?.as_str()?;
                Some(ToolReturnPart {
                    tool_name: result.function.clone(),
                    tool_call_id: id.to_string(),
                    content: result.data.get(idx).cloned(),
                })
            })
            .collect();
        return Ok(returns);
    }

    let id = result
        .extra_state
        .tool_call_id()
        .ok_or_else(|| BridgeError::MissingToolCallId {
            function: result.function.clone(),
        })?;
    let content = match result.extra_state.rehydrated_result() {
        Some(original) => original.clone(),
        None => result.serialized_content(),
    };
    Ok(vec![ToolReturnPart {
        tool_name: result.function.clone(),
        tool_call_id: id.to_string(),
        content: Some(content),
    }])
}

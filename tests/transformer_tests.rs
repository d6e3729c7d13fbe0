//! Tests for host history -> runtime history transformation.

mod common;

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use hostbridge::capsule::{pack_tool_history, LocalToolEntry};
use hostbridge::config::names::{EXECUTE_AGENT_TOOL, GET_WIDGET_DATA};
use hostbridge::prelude::*;
use hostbridge::transform::split_pending;
use hostbridge::types::{FunctionCall, MessagePart};

use common::{news_widget, parts, quote_widget};

fn plain() -> MessageTransformer {
    MessageTransformer::new(
        &BridgeConfig::builder()
            .enable_progressive_discovery(false)
            .build(),
    )
}

fn batch_fetch() -> (FunctionCall, FunctionCallResult) {
    let sources = json!([
        quote_widget().data_source(json!({"symbol": "AAPL"}).as_object().cloned().unwrap()),
        news_widget().data_source(json!({"ticker": "AAPL"}).as_object().cloned().unwrap()),
    ]);
    let call = FunctionCall::new(GET_WIDGET_DATA, json!({"data_sources": sources}));
    let result = FunctionCallResult::new(GET_WIDGET_DATA, json!({"data_sources": sources}))
        .with_data(vec![json!({"items": [{"content": "quote"}]}), json!({"items": [{"content": "news"}]})])
        .with_extra_state(json!({"tool_calls": [
            {"tool_call_id": "q1", "widget_uuid": common::QUOTE_UUID},
            {"tool_call_id": "n1", "widget_uuid": common::NEWS_UUID},
        ]}));
    (call, result)
}

fn ids(parts: &[&MessagePart]) -> (Vec<String>, Vec<String>) {
    let mut calls = Vec::new();
    let mut returns = Vec::new();
    for part in parts {
        match part {
            MessagePart::ToolCall(call) => calls.push(call.tool_call_id.clone()),
            MessagePart::ToolReturn(ret) => returns.push(ret.tool_call_id.clone()),
            _ => {}
        }
    }
    (calls, returns)
}

#[test]
fn batched_fetch_is_split_per_source_with_symmetric_ids() {
    let (call, result) = batch_fetch();
    let messages = plain()
        .transform_batch(&[
            HostMessage::user("compare"),
            HostMessage::AssistantFunctionCall(call),
            HostMessage::FunctionCallResult(result),
        ])
        .unwrap();

    let parts = parts(&messages);
    let (calls, returns) = ids(&parts);
    assert_eq!(calls, vec!["q1", "n1"]);
    assert_eq!(
        calls.iter().collect::<BTreeSet<_>>(),
        returns.iter().collect::<BTreeSet<_>>()
    );

    let MessagePart::ToolCall(first) = parts[1] else {
        panic!("expected a call");
    };
    assert_eq!(first.args["data_sources"].as_array().unwrap().len(), 1);
    assert_eq!(first.args["data_sources"][0]["widget_uuid"], json!(common::QUOTE_UUID));
}

#[test]
fn batched_results_are_unbundled_by_position() {
    let (_, result) = batch_fetch();
    let messages = plain()
        .transform_batch(&[HostMessage::FunctionCallResult(result)])
        .unwrap();
    let contents: Vec<Option<Value>> = parts(&messages)
        .into_iter()
        .filter_map(|part| match part {
            MessagePart::ToolReturn(ret) => Some(ret.content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        contents,
        vec![
            Some(json!({"items": [{"content": "quote"}]})),
            Some(json!({"items": [{"content": "news"}]})),
        ]
    );
}

/// Attribution is positional only: when the host drops a middle data entry
/// every later id receives its neighbour's data, and the last id gets none.
#[test]
fn dropped_middle_entry_shifts_attribution() {
    let result = FunctionCallResult::new(GET_WIDGET_DATA, json!({}))
        .with_data(vec![json!("first"), json!("third")])
        .with_extra_state(json!({"tool_calls": [
            {"tool_call_id": "a"},
            {"tool_call_id": "b"},
            {"tool_call_id": "c"},
        ]}));
    let messages = plain()
        .transform_batch(&[HostMessage::FunctionCallResult(result)])
        .unwrap();
    let returns: Vec<(String, Option<Value>)> = parts(&messages)
        .into_iter()
        .filter_map(|part| match part {
            MessagePart::ToolReturn(ret) => Some((ret.tool_call_id.clone(), ret.content.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        returns,
        vec![
            ("a".to_string(), Some(json!("first"))),
            ("b".to_string(), Some(json!("third"))),
            ("c".to_string(), None),
        ]
    );
}

#[test]
fn calls_draw_ids_in_order_per_function() {
    let first = FunctionCallResult::new("lookup", json!({"q": 1}))
        .with_extra_state(json!({"tool_call_id": "l1"}));
    let second = FunctionCallResult::new("lookup", json!({"q": 2}))
        .with_extra_state(json!({"tool_call_id": "l2"}));
    let messages = plain()
        .transform_batch(&[
            HostMessage::AssistantFunctionCall(FunctionCall::new("lookup", json!({"q": 1}))),
            HostMessage::FunctionCallResult(first),
            HostMessage::assistant("one more"),
            HostMessage::AssistantFunctionCall(FunctionCall::new("lookup", json!({"q": 2}))),
            HostMessage::FunctionCallResult(second),
        ])
        .unwrap();
    let (calls, returns) = ids(&parts(&messages));
    assert_eq!(calls, vec!["l1", "l2"]);
    assert_eq!(returns, vec!["l1", "l2"]);
}

#[test]
fn more_calls_than_ids_is_a_contract_violation() {
    let (call, _) = batch_fetch();
    let only_one = FunctionCallResult::new(GET_WIDGET_DATA, json!({}))
        .with_extra_state(json!({"tool_call_id": "q1"}));
    let err = plain()
        .transform_batch(&[
            HostMessage::AssistantFunctionCall(call),
            HostMessage::FunctionCallResult(only_one),
        ])
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        BridgeError::InsufficientToolCallIds { needed: 2, available: 1, .. }
    ));
}

#[test]
fn remote_dispatch_is_rewritten_to_call_tools() {
    let args = json!({"server_id": "search-server", "tool_name": "web_search", "parameters": {"query": "rates"}});
    let result = FunctionCallResult::new(EXECUTE_AGENT_TOOL, args.clone())
        .with_data(vec![json!("Rates held")])
        .with_extra_state(json!({"tool_calls": [
            {"tool_call_id": "r1", "tool_name": "web_search", "server_id": "search-server"},
        ]}));
    let messages = MessageTransformer::new(&BridgeConfig::default())
        .transform_batch(&[
            HostMessage::AssistantFunctionCall(FunctionCall::new(EXECUTE_AGENT_TOOL, args)),
            HostMessage::FunctionCallResult(result),
        ])
        .unwrap();
    let parts = parts(&messages);
    let MessagePart::ToolCall(call) = parts[0] else {
        panic!("expected a call");
    };
    assert_eq!(call.tool_name, "call_tools");
    assert_eq!(
        call.args,
        json!({"calls": [{"tool_name": "web_search", "arguments": {"query": "rates"}}]})
    );
}

#[test]
fn capsule_history_is_injected_before_the_deferred_call() {
    let entries = vec![LocalToolEntry {
        tool_call_id: "local-1".into(),
        tool_name: "list_tools".into(),
        args: serde_json::Map::new(),
        result: json!("# widgets_primary\n- openbb_widget_stock_quote"),
    }];
    let capsule = pack_tool_history(&entries).unwrap();
    let source = quote_widget().data_source(serde_json::Map::new());
    let extra_state = json!({
        "tool_calls": [{"tool_call_id": "w1", "widget_uuid": common::QUOTE_UUID}],
        "openbb_local_tool_capsule": capsule,
    });
    let history = [
        HostMessage::user("quote please"),
        HostMessage::AssistantFunctionCall(FunctionCall::new(
            GET_WIDGET_DATA,
            json!({"data_sources": [source.clone()]}),
        )),
        HostMessage::FunctionCallResult(
            FunctionCallResult::new(GET_WIDGET_DATA, json!({"data_sources": [source]}))
                .with_extra_state(extra_state),
        ),
    ];

    let messages = plain().transform_batch(&history).unwrap();
    let (calls, returns) = ids(&parts(&messages));
    assert_eq!(calls, vec!["local-1", "w1"]);
    assert_eq!(returns, vec!["local-1", "w1"]);

    let disabled = MessageTransformer::new(
        &BridgeConfig::builder()
            .enable_progressive_discovery(false)
            .enable_local_tool_capsule(false)
            .build(),
    );
    let (calls, _) = ids(&parts(&disabled.transform_batch(&history).unwrap()));
    assert_eq!(calls, vec!["w1"]);
}

#[test]
fn corrupt_capsule_is_ignored() {
    let result = FunctionCallResult::new("lookup", json!({})).with_extra_state(json!({
        "tool_call_id": "l1",
        "openbb_local_tool_capsule": "not-a-capsule",
    }));
    let messages = plain()
        .transform_batch(&[HostMessage::FunctionCallResult(result)])
        .unwrap();
    assert_eq!(ids(&parts(&messages)).1, vec!["l1"]);
}

#[test]
fn pending_results_stay_in_history() {
    let result = FunctionCallResult::new("lookup", json!({}))
        .with_extra_state(json!({"tool_call_id": "l1"}));
    let messages = vec![
        HostMessage::user("hi"),
        HostMessage::AssistantFunctionCall(FunctionCall::new("lookup", json!({}))),
        HostMessage::FunctionCallResult(result.clone()),
    ];
    let output = plain().transform(&messages).unwrap();
    assert_eq!(output.pending, vec![result]);
    assert_eq!(split_pending(&messages).len(), 1);
    assert_eq!(ids(&parts(&output.messages)).1, vec!["l1"]);
}

//! Tests for driving the event stream engine over runtime event streams.

mod common;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hostbridge::capsule::unpack_value;
use hostbridge::config::names::{EXECUTE_AGENT_TOOL, TABLE_TOOL, THINKING_LABEL};
use hostbridge::prelude::*;
use hostbridge::types::{DeferredToolRequests, ToolCallPart, ToolOutput};

use common::{call, dispatches, drive, engine, names, quote_widget, steps, streamed_text, text, widget_result};

fn returned(name: &str, id: &str, content: impl Into<ToolOutput>) -> RuntimeEvent {
    RuntimeEvent::FunctionToolResult {
        result: ToolResultPart::returned(name, id, content),
    }
}

fn deferred(parent_id: &str, nested: Vec<ToolCallPart>) -> RuntimeEvent {
    returned(
        "call_tools",
        parent_id,
        ToolOutput::Deferred(DeferredToolRequests { calls: nested }),
    )
}

#[tokio::test]
async fn pending_results_replay_before_runtime_text() {
    let pending = widget_result(
        &quote_widget(),
        "w1",
        json!({"symbol": "AAPL"}),
        "[{\"symbol\": \"AAPL\", \"price\": 187.2}]",
    );
    let engine = engine(&BridgeConfig::default()).with_pending_results(vec![pending]);

    let events = drive(engine, vec![text("AAPL trades at 187.2.")]).await;

    assert_eq!(
        names(&events),
        vec!["reasoning_step", "text_chunk", "citation_collection"]
    );
    assert_eq!(steps(&events)[0].message, "Data retrieved");
    assert_eq!(streamed_text(&events), "AAPL trades at 187.2.");

    let HostEvent::CitationCollection { citations } = events.last().unwrap() else {
        panic!("expected citations last");
    };
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].source_info.name.as_deref(), Some("Stock Quote"));
    assert_eq!(
        citations[0].source_info.metadata["input_args"],
        json!({"symbol": "AAPL"})
    );
}

#[tokio::test]
async fn upstream_error_emits_one_error_step_and_stops() {
    let input = futures::stream::iter(vec![
        Ok(text("Looking")),
        Err(BridgeError::Stream("connection reset".into())),
        Ok(text(" never seen")),
    ]);
    let events: Vec<HostEvent> = engine(&BridgeConfig::default())
        .run(input, CancellationToken::new())
        .collect()
        .await;

    assert_eq!(names(&events), vec!["text_chunk", "reasoning_step"]);
    let error = steps(&events)[0];
    assert_eq!(error.level, StepLevel::Error);
    assert!(error.message.contains("connection reset"));
    assert_eq!(streamed_text(&events), "Looking");
}

#[tokio::test]
async fn cancelled_before_start_emits_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pending = widget_result(&quote_widget(), "w1", json!({}), "[]");
    let events: Vec<HostEvent> = engine(&BridgeConfig::default())
        .with_pending_results(vec![pending])
        .run(futures::stream::iter(vec![Ok::<_, BridgeError>(text("hi"))]), cancel)
        .collect()
        .await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn cancellation_mid_stream_skips_the_final_flush() {
    let cancel = CancellationToken::new();
    let pending = widget_result(&quote_widget(), "w1", json!({"symbol": "MSFT"}), "[{\"price\": 1}]");
    let input = futures::stream::iter(vec![Ok::<_, BridgeError>(text("partial answer"))])
        .chain(futures::stream::pending());
    let mut out = engine(&BridgeConfig::default())
        .with_pending_results(vec![pending])
        .run(input, cancel.clone());

    assert!(matches!(out.next().await, Some(HostEvent::ReasoningStep(_))));
    assert_eq!(out.next().await, Some(HostEvent::text("partial answer")));
    cancel.cancel();
    assert_eq!(out.next().await, None);
}

#[tokio::test]
async fn thinking_becomes_a_single_step() {
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![
            RuntimeEvent::ThinkingStart {
                content: "Need the ".into(),
            },
            RuntimeEvent::ThinkingDelta {
                delta: "latest quote".into(),
            },
            RuntimeEvent::ThinkingEnd {
                content: String::new(),
            },
            text("Done."),
        ],
    )
    .await;

    assert_eq!(names(&events), vec!["reasoning_step", "text_chunk"]);
    let thinking = steps(&events)[0];
    assert_eq!(thinking.message, THINKING_LABEL);
    assert_eq!(
        thinking.details.as_ref().unwrap()[THINKING_LABEL],
        json!("Need the latest quote")
    );
}

#[tokio::test]
async fn table_artifact_lands_at_placeholder() {
    let artifact = ClientArtifact::table(vec![json!({"symbol": "AAPL", "pe": 29.1})], Some("Valuation"), None);
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![
            call(TABLE_TOOL, "t1", json!({"data": [{"symbol": "AAPL", "pe": 29.1}]})),
            text("Valuation:\n{{place_"),
            text("chart_here}}\nThat is rich."),
            RuntimeEvent::FunctionToolResult {
                result: ToolResultPart::returned(TABLE_TOOL, "t1", json!("Table created successfully."))
                    .with_metadata(json!({"table": serde_json::to_value(&artifact).unwrap()})),
            },
        ],
    )
    .await;

    let tail: Vec<&HostEvent> = events
        .iter()
        .filter(|event| !matches!(event, HostEvent::ReasoningStep(_)))
        .collect();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[0], &HostEvent::text("Valuation:\n"));
    assert!(matches!(tail[1], HostEvent::Artifact(a) if a.name == "Valuation"));
    assert_eq!(tail[2], &HostEvent::text("\nThat is rich."));
}

#[tokio::test]
async fn only_configured_tokens_hold_back_text() {
    let config = BridgeConfig::builder()
        .placeholder_tokens(vec!["[[chart]]".to_string()])
        .build();
    let events = drive(
        engine(&config),
        vec![text("A {{place_chart_here}} B [[chart]] C")],
    )
    .await;
    // No artifact ever arrives, so the held token is flushed as text.
    assert_eq!(
        events,
        vec![
            HostEvent::text("A {{place_chart_here}} B "),
            HostEvent::text("[[chart]] C"),
        ]
    );
}

#[tokio::test]
async fn discovery_flow_dispatches_remote_tool_with_capsule() {
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![
            call("list_tools", "l1", json!({})),
            returned("list_tools", "l1", json!("# agent_tools\n- web_search")),
            call(
                "call_tools",
                "c1",
                json!({"calls": [{"tool_name": "web_search", "arguments": {"query": "fed rates"}}]}),
            ),
            deferred(
                "c1",
                vec![ToolCallPart::new("web_search", "c1", json!({"query": "fed rates"}))],
            ),
        ],
    )
    .await;

    let calling: Vec<&str> = steps(&events)
        .into_iter()
        .map(|step| step.message.as_str())
        .filter(|message| message.starts_with("Calling tool"))
        .collect();
    assert_eq!(calling, vec!["Calling tool 'list_tools'", "Calling tool 'web_search'"]);

    let sent = dispatches(&events);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].function, EXECUTE_AGENT_TOOL);
    assert_eq!(sent[0].input_arguments["tool_name"], json!("web_search"));
    assert_eq!(sent[0].input_arguments["server_id"], json!("search-server"));
    assert_eq!(sent[0].input_arguments["parameters"], json!({"query": "fed rates"}));
    assert_eq!(sent[0].extra_state.tool_call_id(), Some("c1"));

    let entries = unpack_value(sent[0].extra_state.capsule().unwrap()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tool_call_id, "l1");
    assert_eq!(entries[0].result, json!("# agent_tools\n- web_search"));
}

#[tokio::test]
async fn capsule_is_omitted_when_disabled() {
    let config = BridgeConfig::builder().enable_local_tool_capsule(false).build();
    let events = drive(
        engine(&config),
        vec![
            call("list_tools", "l1", json!({})),
            returned("list_tools", "l1", json!("tools")),
            deferred(
                "c1",
                vec![ToolCallPart::new("web_search", "c1", json!({"query": "x"}))],
            ),
        ],
    )
    .await;
    assert!(dispatches(&events)[0].extra_state.capsule().is_none());
}

#[tokio::test]
async fn final_output_is_used_when_nothing_streamed() {
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![RuntimeEvent::RunResult {
            output: RunOutput::Value(json!("No widgets needed.")),
        }],
    )
    .await;
    assert_eq!(events, vec![HostEvent::text("No widgets needed.")]);
}

fn deferred_run(nested: Vec<ToolCallPart>) -> RuntimeEvent {
    RuntimeEvent::RunResult {
        output: RunOutput::Deferred(DeferredToolRequests { calls: nested }),
    }
}

#[tokio::test]
async fn host_envelopes_are_unwrapped_before_dispatch() {
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![deferred_run(vec![ToolCallPart::new(
            "call_tools",
            "c1",
            json!({"calls": [
                {
                    "tool_name": "openbb_widget_stock_quote",
                    "arguments": {"data_sources": [{
                        "widget_uuid": common::QUOTE_UUID,
                        "id": "stock_quote",
                        "input_args": {"symbol": "AAPL"},
                    }]},
                },
                {
                    "tool_name": "web_search",
                    "arguments": {
                        "server_id": "search-server",
                        "tool_name": "web_search",
                        "parameters": {"query": "rates"},
                    },
                },
            ]}),
        )])],
    )
    .await;

    let sent = dispatches(&events);
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0].input_arguments["data_sources"][0]["input_args"],
        json!({"symbol": "AAPL"})
    );
    assert_eq!(sent[1].function, EXECUTE_AGENT_TOOL);
    assert_eq!(sent[1].input_arguments["parameters"], json!({"query": "rates"}));
}

#[tokio::test]
async fn stray_and_repeated_results_are_ignored() {
    let events = drive(
        engine(&BridgeConfig::default()),
        vec![
            call("lookup", "l1", json!({"company": "Apple"})),
            returned("lookup", "ghost", json!("orphan")),
            returned("lookup", "l1", json!("AAPL")),
            returned("lookup", "l1", json!("AAPL again")),
            text("Apple is AAPL."),
        ],
    )
    .await;

    assert_eq!(
        names(&events),
        vec!["reasoning_step", "reasoning_step", "text_chunk"]
    );
    assert_eq!(steps(&events)[1].message, "Tool 'lookup' returned");
    assert_eq!(streamed_text(&events), "Apple is AAPL.");
}

#[tokio::test]
async fn wrapped_call_ids_follow_batch_size() {
    let single = drive(
        engine(&BridgeConfig::default()),
        vec![deferred_run(vec![ToolCallPart::new(
            "call_tools",
            "P",
            json!({"calls": [{"tool_name": "web_search", "arguments": {"query": "cpi"}}]}),
        )])],
    )
    .await;
    assert_eq!(dispatches(&single)[0].extra_state.tool_call_id(), Some("P"));

    let batch = drive(
        engine(&BridgeConfig::default()),
        vec![deferred_run(vec![ToolCallPart::new(
            "call_tools",
            "P",
            json!({"calls": [
                {"tool_name": "web_search", "arguments": {"query": "cpi"}},
                {"tool_name": "web_search", "arguments": {"query": "ppi"}},
            ]}),
        )])],
    )
    .await;
    let ids: Vec<Option<&str>> = dispatches(&batch)
        .into_iter()
        .map(|call| call.extra_state.tool_call_id())
        .collect();
    assert_eq!(ids, vec![Some("P-0"), Some("P-1")]);
}

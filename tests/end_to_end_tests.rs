//! Tests for a full request round trip: adapter, discovery, engine and the
//! follow-up turn through the transformer.

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use hostbridge::config::names::GET_WIDGET_DATA;
use hostbridge::prelude::*;
use hostbridge::tools::ToolArguments;
use hostbridge::types::{FunctionCall, MessagePart};

use common::{dispatches, drive, parts, steps};

const FINANCIALS_UUID: &str = "9a1d-financials";

fn request(messages: Vec<HostMessage>) -> BridgeRequest {
    BridgeRequest {
        messages,
        widgets: WidgetCollection {
            primary: vec![Widget::new(FINANCIALS_UUID, "OpenBB", "financials", "Financials")],
            ..Default::default()
        },
        tools: Vec::new(),
    }
}

/// First turn: the model calls the widget through `call_tools`; the host
/// receives one request step and one fetch dispatch.
async fn first_turn() -> Vec<HostEvent> {
    let adapter =
        BridgeAdapter::new(request(vec![HostMessage::user("show AAPL")]), BridgeConfig::default())
            .unwrap();
    assert_eq!(adapter.messages().len(), 1);

    let toolsets = adapter.toolsets().unwrap();
    assert_eq!(toolsets.len(), 1);
    let discovery = &toolsets[0];

    let call_args = json!({"calls": [{"tool_name": "openbb_widget_financials", "arguments": {"symbol": "AAPL"}}]});
    let outcome = discovery
        .invoke("call_tools", &ToolArguments::new(call_args.clone()))
        .await
        .unwrap();
    let result = outcome.into_result_part("call_tools", "call_1");

    drive(
        adapter.event_stream(),
        vec![
            RuntimeEvent::FunctionToolCall {
                part: hostbridge::types::ToolCallPart::new("call_tools", "call_1", call_args),
            },
            RuntimeEvent::FunctionToolResult { result },
        ],
    )
    .await
}

#[tokio::test]
async fn show_aapl_requests_one_widget_fetch() {
    let events = first_turn().await;

    let steps = steps(&events);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].message, "Requesting widget 'Financials'");
    let details = steps[0].details.as_ref().unwrap();
    assert_eq!(details["symbol"], json!("AAPL"));

    let calls = dispatches(&events);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].function, GET_WIDGET_DATA);
    let refs = calls[0].extra_state.tool_calls();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].tool_call_id, "call_1");
    assert_eq!(refs[0].tool_name.as_deref(), Some("openbb_widget_financials"));
    assert_eq!(
        calls[0].input_arguments["data_sources"][0]["input_args"],
        json!({"symbol": "AAPL"})
    );
}

#[tokio::test]
async fn second_turn_replays_fetch_as_call_tools() {
    let events = first_turn().await;
    let dispatch = dispatches(&events)[0].clone();

    let history = vec![
        HostMessage::user("show AAPL"),
        HostMessage::AssistantFunctionCall(FunctionCall::new(
            dispatch.function.clone(),
            Value::Object(dispatch.input_arguments.clone()),
        )),
        HostMessage::FunctionCallResult(
            FunctionCallResult::new(GET_WIDGET_DATA, Value::Object(dispatch.input_arguments.clone()))
                .with_data(vec![json!({"items": [{"content": "[{\"revenue\": 391035, \"year\": 2024}]"}]})])
                .with_extra_state(Value::Object(dispatch.extra_state.0.clone())),
        ),
    ];
    let adapter = BridgeAdapter::new(request(history), BridgeConfig::default()).unwrap();

    let parts = parts(adapter.messages());
    let MessagePart::ToolCall(call) = parts[1] else {
        panic!("expected the replayed call, got {:?}", parts[1]);
    };
    assert_eq!(call.tool_name, "call_tools");
    assert_eq!(call.tool_call_id, "call_1");
    assert_eq!(
        call.args,
        json!({"calls": [{"tool_name": "openbb_widget_financials", "arguments": {"symbol": "AAPL"}}]})
    );
    let MessagePart::ToolReturn(ret) = parts[2] else {
        panic!("expected the replayed return");
    };
    assert_eq!(ret.tool_name, "call_tools");
    assert_eq!(ret.tool_call_id, "call_1");

    assert_eq!(adapter.pending_results().len(), 1);
    let events = drive(adapter.event_stream(), vec![common::text("Revenue was $391B.")]).await;
    assert_eq!(
        common::names(&events),
        vec!["reasoning_step", "text_chunk", "citation_collection"]
    );
    let data_step = steps(&events)[0];
    assert_eq!(data_step.message, "Data retrieved");
    assert_eq!(data_step.artifacts[0].name, "Financials");
}

#[tokio::test]
async fn second_turn_without_progressive_keeps_host_names() {
    let events = first_turn().await;
    let dispatch = dispatches(&events)[0].clone();
    let history = vec![
        HostMessage::user("show AAPL"),
        HostMessage::AssistantFunctionCall(FunctionCall::new(
            GET_WIDGET_DATA,
            Value::Object(dispatch.input_arguments.clone()),
        )),
        HostMessage::FunctionCallResult(
            FunctionCallResult::new(GET_WIDGET_DATA, Value::Object(dispatch.input_arguments.clone()))
                .with_extra_state(Value::Object(dispatch.extra_state.0.clone())),
        ),
    ];
    let config = BridgeConfig::builder().enable_progressive_discovery(false).build();
    let adapter = BridgeAdapter::new(request(history), config).unwrap();

    let parts = parts(adapter.messages());
    let MessagePart::ToolCall(call) = parts[1] else {
        panic!("expected the replayed call");
    };
    assert_eq!(call.tool_name, GET_WIDGET_DATA);
}

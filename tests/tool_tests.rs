//! Tests for the tool system.

use std::sync::Arc;

use serde_json::json;

use hostbridge::config::names::CHART_TOOL;
use hostbridge::error::BridgeError;
use hostbridge::tools::tool::{FunctionTool, Tool, ToolExecutionContext, ToolReturn};
use hostbridge::tools::viz::viz_source;
use hostbridge::tools::*;
use hostbridge::types::{ToolOutput, ToolResultPart};

fn lookup_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "lookup_symbol",
        "Resolve a company name to a ticker",
        ToolParameters::object()
            .string("company", "Company name", true)
            .string_enum("exchange", "Listing venue", &["NYSE", "NASDAQ"], false)
            .build(),
        |args, _ctx| async move {
            let company = args.get_str("company")?;
            Ok(ToolReturn::new(json!({"company": company, "symbol": "AAPL"})))
        },
    ))
}

#[test]
fn parameter_builder_constructs_schema() {
    let params = ToolParameters::object()
        .string("query", "Search query", true)
        .array("symbols", "Tickers", json!({"type": "string"}), false)
        .build();

    let schema = &params.schema;
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["properties"]["symbols"]["items"]["type"], "string");
    assert_eq!(schema["required"], json!(["query"]));
}

#[test]
fn permissive_parameters_accept_anything() {
    let params = ToolParameters::permissive();
    assert_eq!(params.schema["additionalProperties"], json!(true));
    assert!(validate_arguments("t", &json!({"any": [1, 2]}), &params.schema).is_ok());
}

#[test]
fn tool_arguments_accessors() {
    let args = ToolArguments::new(json!({"query": "cpi", "tool_names": ["a", "b"], "group": 3}));
    assert_eq!(args.get_str("query").unwrap(), "cpi");
    assert!(args.get_str("missing").is_err());
    assert_eq!(args.get_str_opt("group"), None);
    assert_eq!(args.get_str_list("tool_names").unwrap(), vec!["a", "b"]);
}

#[test]
fn tool_arguments_deserialize() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Params {
        query: String,
        limit: Option<u32>,
    }

    let args = ToolArguments::new(json!({"query": "rust", "limit": 10}));
    let params: Params = args.deserialize().unwrap();
    assert_eq!(params.query, "rust");
    assert_eq!(params.limit, Some(10));
}

#[test]
fn validation_reports_first_violation() {
    let schema = lookup_tool().parameters().schema.clone();
    let err = validate_arguments("lookup_symbol", &json!({}), &schema).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid argument: lookup_symbol: missing required field 'company'"
    );

    let err = validate_arguments(
        "lookup_symbol",
        &json!({"company": "Apple", "exchange": "LSE"}),
        &schema,
    )
    .unwrap_err();
    assert!(err.to_string().contains("field 'exchange' must be one of"));
}

#[tokio::test]
async fn function_tool_executes() {
    let tool = lookup_tool();
    assert_eq!(tool.name(), "lookup_symbol");

    let args = ToolArguments::new(json!({"company": "Apple"}));
    let result = tool
        .execute(&args, &ToolExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(result.value["symbol"], "AAPL");
    assert!(result.metadata.is_none());
}

#[tokio::test]
async fn function_source_rejects_invalid_arguments_before_running() {
    let source = FunctionToolSource::new("lookup", vec![lookup_tool()]);
    let err = source
        .invoke("lookup_symbol", &ToolArguments::new(json!({"company": 7})))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));

    let err = source
        .invoke("unknown", &ToolArguments::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ToolNotFound { .. }));
}

#[tokio::test]
async fn chart_tool_enforces_keys_per_chart_type() {
    let source = viz_source();
    let err = source
        .invoke(
            CHART_TOOL,
            &ToolArguments::new(json!({"type": "bar", "data": [{"d": "2024", "v": 1}], "x_key": "d"})),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid argument: y_keys is required for line, bar, and scatter charts"
    );

    let outcome = source
        .invoke(
            CHART_TOOL,
            &ToolArguments::new(json!({
                "type": "bar",
                "data": [{"d": "2024", "v": 1}],
                "x_key": "d",
                "y_keys": ["v"],
                "name": "Revenue",
            })),
        )
        .await
        .unwrap();
    let ToolOutcome::Completed(ret) = outcome else {
        panic!("chart tool should complete");
    };
    let metadata = ret.metadata.unwrap();
    assert_eq!(metadata["chart"]["name"], "Revenue");
    assert_eq!(metadata["chart"]["chart_params"]["chart_type"], "bar");
}

#[test]
fn deferred_outcome_numbers_several_calls() {
    let outcome = ToolOutcome::Deferred(vec![
        DeferredCall {
            tool_name: "openbb_widget_quote".into(),
            arguments: serde_json::Map::new(),
        },
        DeferredCall {
            tool_name: "openbb_widget_news".into(),
            arguments: serde_json::Map::new(),
        },
    ]);
    let ToolResultPart::Return { content, .. } = outcome.into_result_part("call_tools", "c9") else {
        panic!("expected a return part");
    };
    let ToolOutput::Deferred(requests) = content else {
        panic!("expected deferred requests");
    };
    let ids: Vec<&str> = requests.calls.iter().map(|c| c.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["c9-0", "c9-1"]);
}

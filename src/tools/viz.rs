//! Local chart, table and html tools.
//!
//! Each tool returns a short confirmation to the model and the rendered
//! artifact in metadata (`chart`, `table` or `html`), which the event stream
//! turns into an inline artifact.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::source::FunctionToolSource;
use super::tool::{FunctionTool, Tool, ToolReturn};
use super::types::ToolParameters;
use crate::config::names::{CHART_TOOL, HTML_TOOL, TABLE_TOOL};
use crate::error::{BridgeError, Result};
use crate::types::{ChartParams, ChartType, ClientArtifact};

/// Group id of the visualization tools.
pub const VIZ_GROUP: &str = "openbb_viz_tools";

#[derive(Debug, Deserialize)]
struct ChartArgs {
    #[serde(rename = "type")]
    chart_type: ChartType,
    data: Vec<Map<String, Value>>,
    x_key: Option<String>,
    y_keys: Option<Vec<String>>,
    angle_key: Option<String>,
    callout_label_key: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

impl ChartArgs {
    fn into_artifact(self) -> Result<ClientArtifact> {
        let missing = |key: &str, kinds: &str| {
            BridgeError::InvalidArgument(format!("{key} is required for {kinds} charts"))
        };
        if self.chart_type.is_cartesian() {
            if self.x_key.as_deref().map_or(true, str::is_empty) {
                return Err(missing("x_key", "line, bar, and scatter"));
            }
            if self.y_keys.as_ref().map_or(true, Vec::is_empty) {
                return Err(missing("y_keys", "line, bar, and scatter"));
            }
        } else {
            if self.angle_key.as_deref().map_or(true, str::is_empty) {
                return Err(missing("angle_key", "pie and donut"));
            }
            if self.callout_label_key.as_deref().map_or(true, str::is_empty) {
                return Err(missing("callout_label_key", "pie and donut"));
            }
        }

        let params = ChartParams {
            chart_type: self.chart_type,
            x_key: self.x_key,
            y_keys: self.y_keys,
            angle_key: self.angle_key,
            callout_label_key: self.callout_label_key,
        };
        let rows = self.data.into_iter().map(Value::Object).collect();
        Ok(ClientArtifact::chart(
            params,
            rows,
            self.name.as_deref(),
            self.description.as_deref(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TableArgs {
    data: Vec<Map<String, Value>>,
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HtmlArgs {
    content: String,
    name: Option<String>,
    description: Option<String>,
}

fn row_items() -> Value {
    json!({"type": "object"})
}

fn artifact_return(message: &str, key: &str, artifact: ClientArtifact) -> Result<ToolReturn> {
    let mut metadata = Map::new();
    metadata.insert(key.to_string(), serde_json::to_value(artifact)?);
    Ok(ToolReturn::new(json!(message)).with_metadata(Value::Object(metadata)))
}

pub fn chart_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        CHART_TOOL,
        "Create a chart artifact (line, bar, scatter, pie, donut). \
         Line, bar and scatter charts require x_key and y_keys; \
         pie and donut charts require angle_key and callout_label_key.",
        ToolParameters::object()
            .string_enum(
                "type",
                "Chart type",
                &["line", "bar", "scatter", "pie", "donut"],
                true,
            )
            .array("data", "List of data points", row_items(), true)
            .string("x_key", "Key plotted on the x axis", false)
            .array("y_keys", "Keys plotted on the y axis", json!({"type": "string"}), false)
            .string("angle_key", "Key sizing each slice", false)
            .string("callout_label_key", "Key labelling each slice", false)
            .string("name", "Chart name", false)
            .string("description", "Chart description", false)
            .build(),
        |args, _ctx| async move {
            let chart: ChartArgs = args.deserialize()?;
            artifact_return("Chart created successfully.", "chart", chart.into_artifact()?)
        },
    ))
}

pub fn table_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        TABLE_TOOL,
        "Create a table artifact from a list of rows.",
        ToolParameters::object()
            .array("data", "List of rows", row_items(), true)
            .string("name", "Table name", false)
            .string("description", "Table description", false)
            .build(),
        |args, _ctx| async move {
            let table: TableArgs = args.deserialize()?;
            let rows = table.data.into_iter().map(Value::Object).collect();
            let artifact =
                ClientArtifact::table(rows, table.name.as_deref(), table.description.as_deref());
            artifact_return("Table created successfully.", "table", artifact)
        },
    ))
}

pub fn html_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        HTML_TOOL,
        "Create an HTML artifact to display rich content inline. \
         No scripts or event handlers; style with CSS and draw graphics with inline SVG.",
        ToolParameters::object()
            .string("content", "The HTML content to render", true)
            .string("name", "Name for the artifact", false)
            .string("description", "Description of the artifact", false)
            .build(),
        |args, _ctx| async move {
            let html: HtmlArgs = args.deserialize()?;
            let artifact =
                ClientArtifact::html(html.content, html.name.as_deref(), html.description.as_deref());
            artifact_return("HTML artifact created successfully.", "html", artifact)
        },
    ))
}

/// Source exposing the three visualization tools.
pub fn viz_source() -> FunctionToolSource {
    FunctionToolSource::new(VIZ_GROUP, vec![chart_tool(), table_tool(), html_tool()])
        .with_description("Create charts, tables and HTML artifacts")
}

//! Outbound host protocol events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::host::ExtraState;
use super::widget::Widget;
use crate::error::BridgeError;

/// Severity of a reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum StepLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// Chart flavours the host can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Scatter,
    Pie,
    Donut,
}

impl ChartType {
    /// Line, bar and scatter charts plot `y_keys` against `x_key`.
    pub fn is_cartesian(self) -> bool {
        matches!(self, Self::Line | Self::Bar | Self::Scatter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Table,
    Chart,
    Html,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartParams {
    pub chart_type: ChartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callout_label_key: Option<String>,
}

/// A table, chart or html block rendered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientArtifact {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Rows for tables and charts, markup for html.
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_params: Option<ChartParams>,
}

impl ClientArtifact {
    pub fn table(rows: Vec<Value>, name: Option<&str>, description: Option<&str>) -> Self {
        Self {
            kind: ArtifactKind::Table,
            name: name.unwrap_or("Table").to_string(),
            description: description.unwrap_or_default().to_string(),
            content: Value::Array(rows),
            chart_params: None,
        }
    }

    pub fn chart(
        params: ChartParams,
        rows: Vec<Value>,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Self {
        Self {
            kind: ArtifactKind::Chart,
            name: name.unwrap_or("Chart").to_string(),
            description: description.unwrap_or_default().to_string(),
            content: Value::Array(rows),
            chart_params: Some(params),
        }
    }

    pub fn html(content: impl Into<String>, name: Option<&str>, description: Option<&str>) -> Self {
        Self {
            kind: ArtifactKind::Html,
            name: name.unwrap_or("HTML Content").to_string(),
            description: description.unwrap_or("HTML artifact").to_string(),
            content: Value::String(content.into()),
            chart_params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReasoningStep {
    #[serde(rename = "eventType", default)]
    pub level: StepLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ClientArtifact>,
}

impl ReasoningStep {
    pub fn new(level: StepLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach details; an empty map is dropped.
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = (!details.is_empty()).then_some(details);
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ClientArtifact>) -> Self {
        self.group = Some("reasoning".into());
        self.artifacts = artifacts;
        self
    }
}

/// Where a citation points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(rename = "type", default = "default_source_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_citable")]
    pub citable: bool,
}

fn default_source_kind() -> String {
    "widget".into()
}

fn default_citable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_info: SourceInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Map<String, Value>>,
}

impl Citation {
    /// Cite a widget invocation; the formatted arguments become the details.
    pub fn for_widget(
        widget: &Widget,
        input_args: &Map<String, Value>,
        details: Map<String, Value>,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("input_args".into(), Value::Object(input_args.clone()));
        Self {
            source_info: SourceInfo {
                kind: default_source_kind(),
                uuid: Some(widget.uuid.clone()),
                origin: Some(widget.origin.clone()),
                widget_id: Some(widget.widget_id.clone()),
                name: (!widget.name.is_empty()).then(|| widget.name.clone()),
                description: (!widget.description.is_empty())
                    .then(|| widget.description.clone()),
                metadata,
                citable: true,
            },
            details: if details.is_empty() {
                Vec::new()
            } else {
                vec![details]
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallEvent {
    pub function: String,
    pub input_arguments: Map<String, Value>,
    #[serde(default)]
    pub extra_state: ExtraState,
}

/// One event of the outbound host stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HostEvent {
    TextChunk { delta: String },
    ReasoningStep(ReasoningStep),
    Artifact(ClientArtifact),
    FunctionCall(FunctionCallEvent),
    CitationCollection { citations: Vec<Citation> },
}

impl HostEvent {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextChunk {
            delta: delta.into(),
        }
    }

    pub fn step(step: ReasoningStep) -> Self {
        Self::ReasoningStep(step)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::ReasoningStep(ReasoningStep::new(StepLevel::Info, message))
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::ReasoningStep(ReasoningStep::new(StepLevel::Warning, message))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::ReasoningStep(ReasoningStep::new(StepLevel::Error, message))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::TextChunk { .. })
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TextChunk { .. } => "text_chunk",
            Self::ReasoningStep(_) => "reasoning_step",
            Self::Artifact(_) => "artifact",
            Self::FunctionCall(_) => "function_call",
            Self::CitationCollection { .. } => "citation_collection",
        }
    }

    /// Encode as one server-sent-events frame.
    pub fn to_sse(&self) -> Result<String, BridgeError> {
        let payload = serde_json::to_value(self)?;
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), data))
    }
}

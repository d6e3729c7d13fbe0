//! Request lifecycle: one host request in, runtime history, toolsets and an
//! event engine out.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::engine::EventStreamEngine;
use crate::error::Result;
use crate::registry::{RemoteToolRegistry, WidgetRegistry};
use crate::tools::source::{ExternalToolSource, ToolSource};
use crate::tools::viz::{viz_source, VIZ_GROUP};
use crate::tools::{merge_progressive, ProgressiveConfig, Toolset};
use crate::transform::{MessageTransformer, TransformOutput};
use crate::types::{FunctionCallResult, HostMessage, RemoteTool, RuntimeMessage, Widget, WidgetCollection};

const WORKSPACE_PREAMBLE: &str = "Following is context about the current active OpenBB Workspace:";
const REMOTE_TOOLS_GROUP: &str = "agent_tools";

/// Body of one host request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    #[serde(default)]
    pub messages: Vec<HostMessage>,
    #[serde(default)]
    pub widgets: WidgetCollection,
    #[serde(default)]
    pub tools: Vec<RemoteTool>,
}

impl BridgeRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Everything derived from a single request. Nothing is shared across requests.
#[derive(Debug)]
pub struct BridgeAdapter {
    config: BridgeConfig,
    widgets: Arc<WidgetRegistry>,
    remote_tools: Arc<RemoteToolRegistry>,
    collection: WidgetCollection,
    transformed: TransformOutput,
}

impl BridgeAdapter {
    /// Build registries and transform the history.
    ///
    /// Fails when the host history violates the call-id contract.
    pub fn new(request: BridgeRequest, config: BridgeConfig) -> Result<Self> {
        let widgets = WidgetRegistry::from_collection(&request.widgets);
        let remote_tools: RemoteToolRegistry = request.tools.into_iter().collect();
        let transformed = MessageTransformer::new(&config).transform(&request.messages)?;

        tracing::debug!(
            messages = transformed.messages.len(),
            pending = transformed.pending.len(),
            widgets = widgets.len(),
            "request transformed"
        );

        Ok(Self {
            config,
            widgets: Arc::new(widgets),
            remote_tools: Arc::new(remote_tools),
            collection: request.widgets,
            transformed,
        })
    }

    /// Parse a JSON request body and build the adapter.
    pub fn from_json(raw: &str, config: BridgeConfig) -> Result<Self> {
        Self::new(BridgeRequest::from_json(raw)?, config)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Runtime history, pending results included.
    pub fn messages(&self) -> &[RuntimeMessage] {
        &self.transformed.messages
    }

    /// Host results answering the previous turn's deferred calls.
    pub fn pending_results(&self) -> &[FunctionCallResult] {
        &self.transformed.pending
    }

    pub fn widgets(&self) -> &WidgetRegistry {
        &self.widgets
    }

    pub fn remote_tools(&self) -> &RemoteToolRegistry {
        &self.remote_tools
    }

    /// Tool sources for the runtime: one per widget priority group, one for
    /// remote tools, and the visualization tools.
    ///
    /// With progressive discovery enabled every source is tagged and the
    /// result is a single discovery toolset.
    pub fn toolsets(&self) -> Result<Vec<Arc<dyn ToolSource>>> {
        let mut sources: Vec<(Arc<dyn ToolSource>, &str)> = Vec::new();

        let mut seen = HashSet::new();
        let groups = [
            ("widgets_primary", &self.collection.primary, "Primary dashboard widgets"),
            ("widgets_secondary", &self.collection.secondary, "Secondary widgets"),
            ("widgets_extra", &self.collection.extra, "Other available widgets"),
        ];
        for (id, widgets, description) in groups {
            let unique: Vec<&Widget> = widgets
                .iter()
                .filter(|widget| seen.insert(widget.tool_name()))
                .collect();
            let source = ExternalToolSource::widgets(id, unique).with_description(description);
            if !source.is_empty() {
                let source: Arc<dyn ToolSource> = Arc::new(source);
                sources.push((source, id));
            }
        }

        let remote = ExternalToolSource::remote_tools(REMOTE_TOOLS_GROUP, self.remote_tools.iter())
            .with_description("Tools executed on remote agent servers");
        if !remote.is_empty() {
            let remote: Arc<dyn ToolSource> = Arc::new(remote);
            sources.push((remote, REMOTE_TOOLS_GROUP));
        }
        let viz: Arc<dyn ToolSource> = Arc::new(viz_source());
        sources.push((viz, VIZ_GROUP));

        if !self.config.enable_progressive_discovery {
            return Ok(sources.into_iter().map(|(source, _)| source).collect());
        }
        let toolsets = sources
            .into_iter()
            .map(|(source, group)| Toolset::progressive(source, ProgressiveConfig::new().group(group)))
            .collect();
        merge_progressive(toolsets)
    }

    /// System instructions: workspace context followed by any source
    /// instructions (the discovery group listing).
    pub async fn instructions(&self) -> Result<String> {
        let mut sections = vec![self.workspace_context()];
        for source in self.toolsets()? {
            if let Some(text) = source.instructions().await? {
                sections.push(text);
            }
        }
        Ok(sections.join("\n\n"))
    }

    /// A fresh engine for this request, primed with the pending results.
    pub fn event_stream(&self) -> EventStreamEngine {
        EventStreamEngine::new(
            Arc::clone(&self.widgets),
            Arc::clone(&self.remote_tools),
            &self.config,
        )
        .with_pending_results(self.transformed.pending.clone())
    }

    fn workspace_context(&self) -> String {
        let mut lines = vec![WORKSPACE_PREAMBLE.to_string()];
        let defaults: Vec<String> = self
            .collection
            .iter()
            .filter_map(|widget| {
                let params = format_widget_params(widget)?;
                let name = if widget.name.is_empty() {
                    &widget.widget_id
                } else {
                    &widget.name
                };
                Some(format!("- {name}: {params}"))
            })
            .collect();
        if !defaults.is_empty() {
            lines.push("<widget_defaults>".into());
            lines.push(
                "Preloaded widget values (reuse unless the user requests different data):".into(),
            );
            lines.extend(defaults);
            lines.push("</widget_defaults>".into());
        }
        lines.join("\n")
    }
}

/// `name=value` pairs from `metadata.params`, current values preferred
/// over defaults.
fn format_widget_params(widget: &Widget) -> Option<String> {
    let params = widget.metadata.get("params")?.as_array()?;
    let entries: Vec<String> = params
        .iter()
        .filter_map(|param| {
            let name = param.get("name")?.as_str()?;
            match (param.get("current_value"), param.get("default_value")) {
                (Some(current), _) if !current.is_null() => {
                    Some(format!("{name}={}", format_param_value(current)))
                }
                (_, Some(default)) if !default.is_null() => Some(format!(
                    "{name}={} (no current value showing default)",
                    format_param_value(default)
                )),
                _ => None,
            }
        })
        .collect();
    (!entries.is_empty()).then(|| entries.join(", "))
}

fn format_param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", format_param_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items.iter().map(format_param_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::discovery::MetaTool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn widget(uuid: &str, id: &str, name: &str) -> Widget {
        Widget::new(uuid, "OpenBB", id, name)
    }

    fn request() -> BridgeRequest {
        let mut quote = widget("u1", "quote", "Quote");
        quote.metadata.insert(
            "params".into(),
            json!([
                {"name": "symbol", "current_value": "AAPL"},
                {"name": "period", "default_value": "1y"},
                {"name": "unused"}
            ]),
        );
        BridgeRequest {
            messages: vec![HostMessage::user("show AAPL")],
            widgets: WidgetCollection {
                primary: vec![quote],
                secondary: vec![widget("u2", "news", "News"), widget("u3", "quote", "Quote copy")],
                extra: Vec::new(),
            },
            tools: vec![RemoteTool::new("web_search", "mcp-1")],
        }
    }

    #[tokio::test]
    async fn progressive_toolsets_collapse_into_discovery() {
        let adapter = BridgeAdapter::new(request(), BridgeConfig::default()).unwrap();
        let toolsets = adapter.toolsets().unwrap();
        assert_eq!(toolsets.len(), 1);
        let names: Vec<String> = toolsets[0]
            .resolve()
            .await
            .unwrap()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, MetaTool::names());
    }

    #[test]
    fn flat_toolsets_without_progressive_discovery() {
        let config = BridgeConfig::builder().enable_progressive_discovery(false).build();
        let adapter = BridgeAdapter::new(request(), config).unwrap();
        let ids: Vec<String> = adapter
            .toolsets()
            .unwrap()
            .iter()
            .map(|source| source.id().to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["widgets_primary", "widgets_secondary", "agent_tools", VIZ_GROUP]
        );
    }

    #[tokio::test]
    async fn instructions_list_widget_defaults_and_groups() {
        let adapter = BridgeAdapter::new(request(), BridgeConfig::default()).unwrap();
        let text = adapter.instructions().await.unwrap();
        assert!(text.starts_with(WORKSPACE_PREAMBLE));
        assert!(text.contains(
            "- Quote: symbol=AAPL, period=1y (no current value showing default)"
        ));
        assert!(text.contains("<group name=\"widgets_primary\""));
        assert!(text.contains("<group name=\"openbb_viz_tools\""));
    }

    #[test]
    fn request_parses_from_json() {
        let raw = json!({
            "messages": [{"role": "human", "content": "hello"}],
            "widgets": {"primary": [{"uuid": "u1", "origin": "OpenBB", "widget_id": "quote", "name": "Quote"}]},
        })
        .to_string();
        let adapter = BridgeAdapter::from_json(&raw, BridgeConfig::default()).unwrap();
        assert_eq!(adapter.messages().len(), 1);
        assert!(adapter.pending_results().is_empty());
        assert!(adapter.widgets().find_by_tool_name("openbb_widget_quote").is_some());
    }

    #[test]
    fn event_stream_carries_pending_results() {
        let mut req = request();
        req.messages.push(HostMessage::FunctionCallResult(
            FunctionCallResult::new("get_widget_data", json!({"data_sources": []}))
                .with_extra_state(json!({"tool_call_id": "c1"})),
        ));
        let adapter = BridgeAdapter::new(req, BridgeConfig::default()).unwrap();
        assert_eq!(adapter.pending_results().len(), 1);
        let mut engine = adapter.event_stream();
        assert!(!engine.before_stream().is_empty());
    }
}

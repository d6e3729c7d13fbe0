//! Host-executed capabilities: widgets and remote tools.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::config::names::WIDGET_TOOL_PREFIX;

/// A host-defined data fetch exposed to the agent as a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub uuid: String,
    pub origin: String,
    pub widget_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Widget {
    pub fn new(
        uuid: impl Into<String>,
        origin: impl Into<String>,
        widget_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            origin: origin.into(),
            widget_id: widget_id.into(),
            name: name.into(),
            description: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Deterministic tool name, e.g. `openbb_widget_sandbox_financials`.
    ///
    /// A leading `openbb_` in the origin is dropped, and a bare `openbb`
    /// origin is omitted entirely.
    pub fn tool_name(&self) -> String {
        let mut origin = slugify(&self.origin);
        if let Some(rest) = origin.strip_prefix("openbb_") {
            origin = rest.to_string();
        } else if origin == "openbb" {
            origin.clear();
        }

        let mut parts = vec![WIDGET_TOOL_PREFIX.to_string()];
        if !origin.is_empty() {
            parts.push(origin);
        }
        parts.push(slugify(&self.widget_id));
        parts.join("_")
    }

    /// Request entry for a `get_widget_data` dispatch.
    pub fn data_source(&self, input_args: Map<String, Value>) -> Value {
        serde_json::json!({
            "widget_uuid": self.uuid,
            "origin": self.origin,
            "id": self.widget_id,
            "input_args": input_args,
        })
    }
}

/// Widgets grouped by priority, as sent by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetCollection {
    #[serde(default)]
    pub primary: Vec<Widget>,
    #[serde(default)]
    pub secondary: Vec<Widget>,
    #[serde(default)]
    pub extra: Vec<Widget>,
}

impl WidgetCollection {
    pub fn iter(&self) -> impl Iterator<Item = &Widget> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .chain(self.extra.iter())
    }
}

/// A tool executed on a remote server through the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_id: Some(server_id.into()),
            url: None,
            endpoint: None,
            description: None,
            input_schema: None,
        }
    }

    /// Server the host should route to: the id, else the url.
    pub fn server_identifier(&self) -> Option<&str> {
        self.server_id.as_deref().or(self.url.as_deref())
    }
}

fn slugify(value: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^0-9A-Za-z]+").expect("valid slug regex"));
    let slug = re.replace_all(value, "_");
    let slug = slug.trim_matches('_').to_lowercase();
    if slug.is_empty() {
        "value".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_name_strips_openbb_origin_prefix() {
        let widget = Widget::new("u1", "OpenBB Sandbox", "financials", "Financials");
        assert_eq!(widget.tool_name(), "openbb_widget_sandbox_financials");
    }

    #[test]
    fn tool_name_drops_bare_openbb_origin() {
        let widget = Widget::new("u1", "OpenBB", "price-chart", "Price");
        assert_eq!(widget.tool_name(), "openbb_widget_price_chart");
    }

    #[test]
    fn tool_name_keeps_other_origins() {
        let widget = Widget::new("u1", "My Backend", "eq.quote", "Quote");
        assert_eq!(widget.tool_name(), "openbb_widget_my_backend_eq_quote");
    }

    #[test]
    fn server_identifier_falls_back_to_url() {
        let mut tool = RemoteTool::new("search", "srv");
        tool.server_id = None;
        tool.url = Some("http://mcp".into());
        assert_eq!(tool.server_identifier(), Some("http://mcp"));
    }
}

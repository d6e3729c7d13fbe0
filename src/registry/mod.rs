//! Lookup tables for host-executed capabilities, built once per request.

use std::collections::HashMap;

use crate::config::names::GET_WIDGET_DATA;
use crate::types::{FunctionCallResult, RemoteTool, Widget, WidgetCollection};

/// Widgets indexed by generated tool name and by uuid.
#[derive(Debug, Clone, Default)]
pub struct WidgetRegistry {
    by_tool_name: HashMap<String, Widget>,
    by_uuid: HashMap<String, Widget>,
    order: Vec<String>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_collection(collection: &WidgetCollection) -> Self {
        collection.iter().cloned().collect()
    }

    /// Register a widget under its generated tool name. The first widget
    /// seen for a uuid or a tool name wins that slot.
    pub fn register(&mut self, widget: Widget) {
        let tool_name = widget.tool_name();
        if !self.by_uuid.contains_key(&widget.uuid) {
            self.by_uuid.insert(widget.uuid.clone(), widget.clone());
        }
        if self.by_tool_name.contains_key(&tool_name) {
            tracing::debug!(tool = %tool_name, uuid = %widget.uuid, "widget tool name already registered");
            return;
        }
        self.order.push(tool_name.clone());
        self.by_tool_name.insert(tool_name, widget);
    }

    pub fn find_by_tool_name(&self, name: &str) -> Option<&Widget> {
        self.by_tool_name.get(name)
    }

    pub fn find_by_uuid(&self, uuid: &str) -> Option<&Widget> {
        self.by_uuid.get(uuid)
    }

    /// Widget that produced a host result: by function name, then by the
    /// first data source of a widget fetch.
    pub fn find_for_result(&self, result: &FunctionCallResult) -> Option<&Widget> {
        if let Some(widget) = self.find_by_tool_name(&result.function) {
            return Some(widget);
        }
        if result.function != GET_WIDGET_DATA {
            return None;
        }
        let uuid = result
            .data_sources()
            .first()
            .and_then(|source| source.get("widget_uuid"))
            .and_then(|v| v.as_str())?;
        self.find_by_uuid(uuid)
    }

    /// `(tool name, widget)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Widget)> {
        self.order
            .iter()
            .filter_map(|name| self.by_tool_name.get(name).map(|w| (name.as_str(), w)))
    }

    pub fn len(&self) -> usize {
        self.by_tool_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tool_name.is_empty()
    }
}

impl FromIterator<Widget> for WidgetRegistry {
    fn from_iter<I: IntoIterator<Item = Widget>>(iter: I) -> Self {
        let mut registry = Self::new();
        for widget in iter {
            registry.register(widget);
        }
        registry
    }
}

/// Remote tools indexed by name.
#[derive(Debug, Clone, Default)]
pub struct RemoteToolRegistry {
    tools: HashMap<String, RemoteTool>,
    order: Vec<String>,
}

impl RemoteToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: RemoteTool) {
        if !self.tools.contains_key(&tool.name) {
            self.order.push(tool.name.clone());
        } else {
            tracing::debug!(tool = %tool.name, "replacing remote tool registration");
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn find(&self, name: &str) -> Option<&RemoteTool> {
        self.tools.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteTool> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<RemoteTool> for RemoteToolRegistry {
    fn from_iter<I: IntoIterator<Item = RemoteTool>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn financials() -> Widget {
        Widget::new("uuid-1", "OpenBB Sandbox", "financials", "Financials")
    }

    #[test]
    fn finds_widget_by_generated_name_and_uuid() {
        let registry: WidgetRegistry = vec![financials()].into_iter().collect();
        assert!(registry
            .find_by_tool_name("openbb_widget_sandbox_financials")
            .is_some());
        assert_eq!(registry.find_by_uuid("uuid-1").map(|w| w.name.as_str()), Some("Financials"));
    }

    #[test]
    fn finds_widget_for_fetch_result_via_data_source() {
        let registry: WidgetRegistry = vec![financials()].into_iter().collect();
        let result = FunctionCallResult::new(
            GET_WIDGET_DATA,
            json!({"data_sources": [{"widget_uuid": "uuid-1", "input_args": {}}]}),
        );
        assert!(registry.find_for_result(&result).is_some());

        let other = FunctionCallResult::new("unrelated", json!({}));
        assert!(registry.find_for_result(&other).is_none());
    }

    #[test]
    fn remote_tools_keep_registration_order() {
        let registry: RemoteToolRegistry = vec![
            RemoteTool::new("b", "srv"),
            RemoteTool::new("a", "srv"),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = registry.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}

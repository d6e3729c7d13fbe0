//! Tool sources: the capability seam between toolsets and the discovery layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext, ToolReturn};
use super::types::ToolParameters;
use super::validation::validate_arguments;
use crate::error::{BridgeError, Result};
use crate::types::{
    DeferredToolRequests, RemoteTool, ToolCallPart, ToolOutput, ToolResultPart, Widget,
};

/// Who executes a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Runs in-process.
    Function,
    /// Runs on the host; calls are deferred back to it.
    External,
}

/// What a source advertises for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub kind: ToolKind,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: ToolParameters::permissive().schema,
            kind,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

/// A call the host must execute.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// Result of invoking a tool through a source.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Completed(ToolReturn),
    Deferred(Vec<DeferredCall>),
}

impl ToolOutcome {
    /// Runtime result part for a call with id `tool_call_id`.
    ///
    /// Deferred calls keep the parent id when there is exactly one of them,
    /// otherwise they are numbered `{parent}-{i}`.
    pub fn into_result_part(self, tool_name: &str, tool_call_id: &str) -> ToolResultPart {
        match self {
            Self::Completed(ret) => {
                let part = ToolResultPart::returned(tool_name, tool_call_id, ret.value);
                match ret.metadata {
                    Some(metadata) => part.with_metadata(metadata),
                    None => part,
                }
            }
            Self::Deferred(calls) => {
                let single = calls.len() == 1;
                let calls = calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, call)| {
                        let id = if single {
                            tool_call_id.to_string()
                        } else {
                            format!("{tool_call_id}-{i}")
                        };
                        ToolCallPart::new(call.tool_name, id, Value::Object(call.arguments))
                    })
                    .collect();
                ToolResultPart::returned(
                    tool_name,
                    tool_call_id,
                    ToolOutput::Deferred(DeferredToolRequests { calls }),
                )
            }
        }
    }
}

/// A group of tools that can be listed and invoked by name.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Group id used in discovery listings.
    fn id(&self) -> &str;

    /// Human description of the group.
    fn describe(&self) -> Option<&str> {
        None
    }

    async fn resolve(&self) -> Result<Vec<ToolDescriptor>>;

    async fn invoke(&self, name: &str, args: &ToolArguments) -> Result<ToolOutcome>;

    /// Extra system-prompt section contributed by this source.
    async fn instructions(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// In-process tools implemented with the [`Tool`] trait.
pub struct FunctionToolSource {
    id: String,
    description: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
}

impl FunctionToolSource {
    pub fn new(id: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            id: id.into(),
            description: None,
            tools,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }
}

impl std::fmt::Debug for FunctionToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionToolSource")
            .field("id", &self.id)
            .field("tools", &self.names())
            .finish()
    }
}

#[async_trait]
impl ToolSource for FunctionToolSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn resolve(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .tools
            .iter()
            .map(|tool| {
                ToolDescriptor::new(tool.name(), tool.description(), ToolKind::Function)
                    .with_schema(tool.parameters().schema.clone())
            })
            .collect())
    }

    async fn invoke(&self, name: &str, args: &ToolArguments) -> Result<ToolOutcome> {
        let tool = self.find(name).ok_or_else(|| BridgeError::ToolNotFound {
            missing: vec![name.to_string()],
            available: self.names(),
        })?;
        let args = ToolArguments::from_map(args.to_map());
        validate_arguments(name, args.raw(), &tool.parameters().schema)?;
        tracing::debug!(tool = %name, source = %self.id, "executing local tool");
        let ret = tool.execute(&args, &ToolExecutionContext::default()).await?;
        Ok(ToolOutcome::Completed(ret))
    }
}

/// Host-executed tools. Every invocation is deferred.
#[derive(Debug, Clone)]
pub struct ExternalToolSource {
    id: String,
    description: Option<String>,
    tools: Vec<ToolDescriptor>,
}

impl ExternalToolSource {
    pub fn new(id: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            id: id.into(),
            description: None,
            tools,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// One tool per widget, named by [`Widget::tool_name`].
    ///
    /// A widget may carry its parameter schema under `metadata.schema`.
    pub fn widgets<'a>(id: impl Into<String>, widgets: impl IntoIterator<Item = &'a Widget>) -> Self {
        let mut tools: Vec<ToolDescriptor> = Vec::new();
        for widget in widgets {
            let name = widget.tool_name();
            if tools.iter().any(|tool| tool.name == name) {
                tracing::debug!(tool = %name, uuid = %widget.uuid, "skipping widget with duplicate tool name");
                continue;
            }
            let description = if widget.description.is_empty() {
                widget.name.clone()
            } else {
                widget.description.clone()
            };
            let mut tool = ToolDescriptor::new(name, description, ToolKind::External);
            if let Some(schema) = widget.metadata.get("schema").filter(|s| s.is_object()) {
                tool = tool.with_schema(schema.clone());
            }
            tools.push(tool);
        }
        Self::new(id, tools)
    }

    pub fn remote_tools<'a>(
        id: impl Into<String>,
        remote: impl IntoIterator<Item = &'a RemoteTool>,
    ) -> Self {
        let tools = remote
            .into_iter()
            .map(|tool| {
                let descriptor = ToolDescriptor::new(
                    tool.name.clone(),
                    tool.description.clone().unwrap_or_default(),
                    ToolKind::External,
                );
                match tool.input_schema.as_ref().filter(|s| s.is_object()) {
                    Some(schema) => descriptor.with_schema(schema.clone()),
                    None => descriptor,
                }
            })
            .collect();
        Self::new(id, tools)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolSource for ExternalToolSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn resolve(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, args: &ToolArguments) -> Result<ToolOutcome> {
        if !self.tools.iter().any(|tool| tool.name == name) {
            return Err(BridgeError::ToolNotFound {
                missing: vec![name.to_string()],
                available: self.tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        Ok(ToolOutcome::Deferred(vec![DeferredCall {
            tool_name: name.to_string(),
            arguments: args.to_map(),
        }]))
    }
}

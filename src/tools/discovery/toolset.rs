//! The discovery toolset: lazy tool registry plus the four meta-tools.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bon::bon;
use regex::Regex;
use serde_json::{json, Map, Value};
use strum::IntoEnumIterator;
use tokio::sync::OnceCell;

use super::{MetaTool, DEFAULT_INSTRUCTIONS, TOOL_GROUPS_PLACEHOLDER};
use crate::config::limits::{
    INSTRUCTION_DESCRIPTION_CHARS, LISTING_DESCRIPTION_CHARS, LIST_PREVIEW_LIMIT,
};
use crate::error::{BridgeError, Result};
use crate::tools::arguments::ToolArguments;
use crate::tools::source::{DeferredCall, ToolDescriptor, ToolKind, ToolOutcome, ToolSource};
use crate::tools::tool::ToolReturn;
use crate::tools::types::ToolParameters;
use crate::util::json::clip;

const DEFAULT_ID: &str = "tool_discovery";

struct RegisteredTool {
    description: String,
    schema: Value,
    group: String,
    kind: ToolKind,
    source: Arc<dyn ToolSource>,
}

/// One entry of a `call_tools` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallSpec {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallSpec {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: crate::types::as_object(arguments),
        }
    }

    /// Parse the `calls` argument: a list of entries, or a lone entry.
    pub fn parse_batch(calls: &Value) -> Result<Vec<Self>> {
        let entries: Vec<&Value> = match calls {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![calls],
            _ => {
                return Err(BridgeError::InvalidArgument(
                    "`calls` must be an object or a list of objects.".into(),
                ))
            }
        };
        if entries.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "`calls` must contain at least one call.".into(),
            ));
        }

        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let name = entry
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        BridgeError::InvalidArgument(format!(
                            "Entry {i} must be an object with a `tool_name` key."
                        ))
                    })?;
                let arguments = match entry.get("arguments") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(args)) => args.clone(),
                    Some(_) => {
                        return Err(BridgeError::InvalidArgument(
                            "Tool arguments must be an object/dictionary.".into(),
                        ))
                    }
                };
                Ok(Self {
                    tool_name: name.to_string(),
                    arguments,
                })
            })
            .collect()
    }
}

/// Exposes tools from several sources through progressive-disclosure meta-tools.
///
/// Sources are resolved once, on first use. Tool names must be unique across
/// all sources.
pub struct ToolDiscoveryToolset {
    id: String,
    sources: Vec<(String, Arc<dyn ToolSource>)>,
    group_descriptions: HashMap<String, String>,
    instruction_template: String,
    excluded: HashSet<MetaTool>,
    registry: OnceCell<BTreeMap<String, RegisteredTool>>,
}

#[bon]
impl ToolDiscoveryToolset {
    /// Groups default to each source's id and description.
    #[builder]
    pub fn new(
        #[builder(default)] sources: Vec<Arc<dyn ToolSource>>,
        #[builder(default)] grouped_sources: Vec<(String, Arc<dyn ToolSource>)>,
        #[builder(default)] group_descriptions: HashMap<String, String>,
        #[builder(into)] id: Option<String>,
        #[builder(into)] instruction_template: Option<String>,
        #[builder(default)] exclude_meta_tools: Vec<String>,
    ) -> Result<Self> {
        if let Some(template) = &instruction_template {
            if !template.contains(TOOL_GROUPS_PLACEHOLDER) {
                return Err(BridgeError::Configuration(
                    "instruction_template must include the '{tool_groups}' placeholder.".into(),
                ));
            }
        }

        let mut excluded = HashSet::new();
        let mut unknown = BTreeSet::new();
        for name in &exclude_meta_tools {
            match name.parse::<MetaTool>() {
                Ok(tool) => {
                    excluded.insert(tool);
                }
                Err(_) => {
                    unknown.insert(name.clone());
                }
            }
        }
        if !unknown.is_empty() {
            let mut valid = MetaTool::names();
            valid.sort();
            return Err(BridgeError::UnknownMetaTool {
                unknown: unknown.into_iter().collect(),
                valid,
            });
        }
        if excluded.contains(&MetaTool::CallTools) {
            tracing::warn!("'call_tools' is excluded; discovered tools cannot be executed");
        }

        let mut all_sources: Vec<(String, Arc<dyn ToolSource>)> = sources
            .into_iter()
            .map(|source| (source.id().to_string(), source))
            .collect();
        all_sources.extend(grouped_sources);

        let mut descriptions = group_descriptions;
        for (group, source) in &all_sources {
            if let Some(description) = source.describe() {
                descriptions
                    .entry(group.clone())
                    .or_insert_with(|| description.to_string());
            }
        }

        Ok(Self {
            id: id.unwrap_or_else(|| DEFAULT_ID.to_string()),
            sources: all_sources,
            group_descriptions: descriptions,
            instruction_template: instruction_template
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            excluded,
            registry: OnceCell::new(),
        })
    }
}

impl ToolDiscoveryToolset {
    /// Whether `tool` is offered to the model.
    pub fn exposes(&self, tool: MetaTool) -> bool {
        !self.excluded.contains(&tool)
    }

    fn exposed_meta_tools(&self) -> impl Iterator<Item = MetaTool> + '_ {
        MetaTool::iter().filter(|tool| self.exposes(*tool))
    }

    async fn registry(&self) -> Result<&BTreeMap<String, RegisteredTool>> {
        self.registry.get_or_try_init(|| self.resolve_sources()).await
    }

    async fn resolve_sources(&self) -> Result<BTreeMap<String, RegisteredTool>> {
        let mut registry: BTreeMap<String, RegisteredTool> = BTreeMap::new();
        for (group, source) in &self.sources {
            let tools = match source.resolve().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "could not resolve tool source");
                    continue;
                }
            };
            for tool in tools {
                if let Some(existing) = registry.get(&tool.name) {
                    return Err(BridgeError::DuplicateTool {
                        name: tool.name,
                        first_group: existing.group.clone(),
                        second_group: group.clone(),
                    });
                }
                let schema = if tool.schema.is_object() {
                    tool.schema
                } else {
                    ToolParameters::permissive().schema
                };
                registry.insert(
                    tool.name,
                    RegisteredTool {
                        description: tool.description,
                        schema,
                        group: group.clone(),
                        kind: tool.kind,
                        source: Arc::clone(source),
                    },
                );
            }
        }
        tracing::debug!(tools = registry.len(), groups = self.sources.len(), "resolved discovery registry");
        Ok(registry)
    }

    fn lookup<'a>(
        registry: &'a BTreeMap<String, RegisteredTool>,
        names: &[&str],
    ) -> Result<Vec<(&'a str, &'a RegisteredTool)>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !registry.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::ToolNotFound {
                missing: missing.into_iter().take(20).collect(),
                available: registry.keys().take(LIST_PREVIEW_LIMIT).cloned().collect(),
            });
        }
        Ok(names
            .iter()
            .filter_map(|name| registry.get_key_value(*name))
            .map(|(name, tool)| (name.as_str(), tool))
            .collect())
    }

    /// Markdown listing grouped by source.
    pub async fn list_tools(&self, group: Option<&str>) -> Result<String> {
        let registry = self.registry().await?;
        let items: Vec<(&str, &RegisteredTool)> = registry
            .iter()
            .filter(|(_, tool)| group.map_or(true, |g| tool.group == g))
            .map(|(name, tool)| (name.as_str(), tool))
            .collect();
        Ok(format_listing(&items, group))
    }

    /// Case-insensitive keyword search over names and descriptions.
    ///
    /// A tool matches when the whole query is a substring of
    /// `"name description"`, or when every query token is.
    pub async fn search_tools(&self, query: &str, group: Option<&str>) -> Result<String> {
        let registry = self.registry().await?;
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Ok("No tools found.".to_string());
        }
        let normalized = q.replace('_', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let items: Vec<(&str, &RegisteredTool)> = registry
            .iter()
            .filter(|(_, tool)| group.map_or(true, |g| tool.group == g))
            .filter(|(name, tool)| {
                let haystack = format!("{name} {}", tool.description).to_lowercase();
                haystack.contains(&q) || tokens.iter().all(|token| haystack.contains(token))
            })
            .map(|(name, tool)| (name.as_str(), tool))
            .collect();
        Ok(format_listing(&items, group))
    }

    /// Schema blocks for the named tools, in request order without duplicates.
    pub async fn get_tool_schema(&self, tool_names: &[String]) -> Result<String> {
        let registry = self.registry().await?;
        let mut seen = HashSet::new();
        let names: Vec<&str> = tool_names
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty() && seen.insert(*name))
            .collect();
        if names.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "`tool_names` must contain at least one tool name.".into(),
            ));
        }

        let blocks: Vec<String> = Self::lookup(registry, &names)?
            .into_iter()
            .map(|(name, tool)| {
                let payload = json!({
                    "description": tool.description,
                    "group": tool.group,
                    "parameters": tool.schema,
                });
                schema_block(name, &payload)
            })
            .collect();
        Ok(blocks.join("\n"))
    }

    /// Execute a batch of discovered tools.
    ///
    /// Host-executed and in-process tools cannot share a batch. A batch of
    /// host tools defers as a whole; a single in-process result carrying
    /// metadata is returned as is, anything else is summarized as markdown.
    pub async fn call_tools(&self, calls: Vec<ToolCallSpec>) -> Result<ToolOutcome> {
        if calls.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "`calls` must contain at least one call.".into(),
            ));
        }
        let registry = self.registry().await?;
        let names: Vec<&str> = calls.iter().map(|c| c.tool_name.as_str()).collect();
        let resolved = Self::lookup(registry, &names)?;

        let mut deferred = BTreeSet::new();
        let mut immediate = BTreeSet::new();
        for (name, tool) in &resolved {
            match tool.kind {
                ToolKind::External => deferred.insert(name.to_string()),
                ToolKind::Function => immediate.insert(name.to_string()),
            };
        }
        if !deferred.is_empty() && !immediate.is_empty() {
            return Err(BridgeError::MixedBatch {
                deferred: deferred.into_iter().take(LIST_PREVIEW_LIMIT).collect(),
                immediate: immediate.into_iter().take(LIST_PREVIEW_LIMIT).collect(),
            });
        }

        let mut deferred_calls: Vec<DeferredCall> = Vec::new();
        let mut results: Vec<(String, ToolReturn)> = Vec::new();
        for (call, (name, tool)) in calls.into_iter().zip(resolved) {
            let args = ToolArguments::from_map(call.arguments);
            match tool.source.invoke(name, &args).await? {
                ToolOutcome::Deferred(calls) => deferred_calls.extend(calls),
                ToolOutcome::Completed(ret) => results.push((name.to_string(), ret)),
            }
        }

        if !deferred_calls.is_empty() {
            return Ok(ToolOutcome::Deferred(deferred_calls));
        }
        if results.len() == 1 && results[0].1.metadata.is_some() {
            if let Some((_, ret)) = results.pop() {
                return Ok(ToolOutcome::Completed(ret));
            }
        }

        let mut lines = vec!["# Results".to_string()];
        for (name, ret) in &results {
            lines.push(String::new());
            lines.push(format!("## {name}"));
            lines.push(result_text(&ret.value));
        }
        Ok(ToolOutcome::Completed(ToolReturn::new(Value::String(
            lines.join("\n"),
        ))))
    }

    /// Resolve sources, then render the instruction prompt.
    pub async fn instructions(&self) -> Result<Option<String>> {
        self.registry().await?;
        Ok(self.render_instructions())
    }

    /// Instruction prompt with the current group listing.
    ///
    /// Groups that have not been resolved yet are listed as pending.
    pub fn render_instructions(&self) -> Option<String> {
        let mut groups: BTreeMap<&str, Vec<(&str, &RegisteredTool)>> = BTreeMap::new();
        if let Some(registry) = self.registry.get() {
            for (name, tool) in registry {
                groups
                    .entry(tool.group.as_str())
                    .or_default()
                    .push((name.as_str(), tool));
            }
        }
        let known: BTreeSet<&str> = self.sources.iter().map(|(group, _)| group.as_str()).collect();
        if groups.is_empty() && known.is_empty() {
            return None;
        }

        let mut lines = Vec::new();
        for (group, tools) in &groups {
            lines.push(format!(
                "<group name=\"{group}\"{} tool_count=\"{}\">",
                self.description_attr(group),
                tools.len()
            ));
            for (name, tool) in tools {
                lines.push(format!(
                    "  <tool name=\"{name}\">{}</tool>",
                    clip(&tool.description, INSTRUCTION_DESCRIPTION_CHARS)
                ));
            }
            lines.push("</group>".to_string());
        }
        for group in known.iter().filter(|group| !groups.contains_key(*group)) {
            lines.push(format!(
                "<group name=\"{group}\"{} tool_count=\"pending\" />",
                self.description_attr(group)
            ));
        }

        let tool_groups = if lines.is_empty() {
            "<group name=\"none\" tool_count=\"0\" />".to_string()
        } else {
            lines.join("\n")
        };
        Some(
            self.instruction_template
                .replace(TOOL_GROUPS_PLACEHOLDER, &tool_groups),
        )
    }

    fn description_attr(&self, group: &str) -> String {
        match self.group_descriptions.get(group).filter(|d| !d.is_empty()) {
            Some(description) => format!(" description=\"{description}\""),
            None => String::new(),
        }
    }

    /// Snapshot of resolved tool names and descriptions.
    pub fn discovered_tools(&self) -> BTreeMap<String, String> {
        self.registry
            .get()
            .map(|registry| {
                registry
                    .iter()
                    .map(|(name, tool)| (name.clone(), tool.description.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn meta_descriptor(tool: MetaTool) -> ToolDescriptor {
        let (description, params) = match tool {
            MetaTool::ListTools => (
                "List available tools and short descriptions, grouped by source.",
                ToolParameters::object().string("group", "Optional exact group id to filter tools", false),
            ),
            MetaTool::SearchTools => (
                "Search tools by keyword in name/description.",
                ToolParameters::object()
                    .string("query", "Case-insensitive keyword to match", true)
                    .string("group", "Optional exact group id to filter tools", false),
            ),
            MetaTool::GetToolSchema => (
                "Return full schema metadata for one or more tools as XML-wrapped JSON objects.",
                ToolParameters::object().array(
                    "tool_names",
                    "Exact tool names from list_tools",
                    json!({"type": "string"}),
                    true,
                ),
            ),
            MetaTool::CallTools => (
                "Execute one or more tools. Each entry needs `tool_name` and optionally `arguments` (object).",
                ToolParameters::object().array(
                    "calls",
                    "Invocation objects",
                    json!({
                        "type": "object",
                        "properties": {
                            "tool_name": {"type": "string", "minLength": 1},
                            "arguments": {"type": "object"},
                        },
                        "required": ["tool_name"],
                    }),
                    true,
                ),
            ),
        };
        ToolDescriptor::new(tool.to_string(), description, ToolKind::Function)
            .with_schema(params.build().schema)
    }
}

impl std::fmt::Debug for ToolDiscoveryToolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<&str> = self.sources.iter().map(|(g, _)| g.as_str()).collect();
        f.debug_struct("ToolDiscoveryToolset")
            .field("id", &self.id)
            .field("groups", &groups)
            .field("resolved", &self.registry.initialized())
            .finish()
    }
}

#[async_trait]
impl ToolSource for ToolDiscoveryToolset {
    fn id(&self) -> &str {
        &self.id
    }

    async fn resolve(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.exposed_meta_tools()
            .map(Self::meta_descriptor)
            .collect())
    }

    async fn invoke(&self, name: &str, args: &ToolArguments) -> Result<ToolOutcome> {
        let tool = name
            .parse::<MetaTool>()
            .ok()
            .filter(|tool| self.exposes(*tool))
            .ok_or_else(|| BridgeError::ToolNotFound {
                missing: vec![name.to_string()],
                available: self.exposed_meta_tools().map(|t| t.to_string()).collect(),
            })?;
        let args = ToolArguments::from_map(args.to_map());
        let text = match tool {
            MetaTool::ListTools => self.list_tools(args.get_str_opt("group")).await?,
            MetaTool::SearchTools => {
                self.search_tools(args.get_str("query")?, args.get_str_opt("group"))
                    .await?
            }
            MetaTool::GetToolSchema => {
                self.get_tool_schema(&args.get_str_list("tool_names")?).await?
            }
            MetaTool::CallTools => {
                let calls = args
                    .raw()
                    .get("calls")
                    .ok_or_else(|| BridgeError::InvalidArgument("Missing array argument: calls".into()))?;
                return self.call_tools(ToolCallSpec::parse_batch(calls)?).await;
            }
        };
        Ok(ToolOutcome::Completed(ToolReturn::new(Value::String(text))))
    }

    async fn instructions(&self) -> Result<Option<String>> {
        ToolDiscoveryToolset::instructions(self).await
    }
}

fn format_listing(items: &[(&str, &RegisteredTool)], group: Option<&str>) -> String {
    if items.is_empty() {
        return match group {
            Some(group) if !group.is_empty() => format!("No tools found for group '{group}'."),
            _ => "No tools found.".to_string(),
        };
    }

    let mut grouped: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (name, tool) in items {
        grouped
            .entry(tool.group.as_str())
            .or_default()
            .push((*name, clip(&tool.description, LISTING_DESCRIPTION_CHARS)));
    }

    let mut lines = Vec::new();
    for (group, tools) in grouped {
        lines.push(format!("# {group}"));
        lines.push(format!("count: {}", tools.len()));
        for (name, description) in tools {
            if description.is_empty() {
                lines.push(format!("- {name}"));
            } else {
                lines.push(format!("- {name}: {description}"));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

fn xml_tag_name() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid tag regex"))
}

fn schema_block(name: &str, payload: &Value) -> String {
    let body = payload.to_string();
    if xml_tag_name().is_match(name) {
        format!("<{name}>\n{body}\n</{name}>")
    } else {
        format!("<tool name=\"{}\">\n{body}\n</tool>", escape_attr(name))
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Text form of a tool result inside a `# Results` summary. Metadata is never included.
fn result_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                "(empty)".to_string()
            } else {
                trimmed.to_string()
            }
        }
        other => other.to_string(),
    }
}

//! Tagging sources for progressive discovery.

use std::collections::HashMap;
use std::sync::Arc;

use super::ToolDiscoveryToolset;
use crate::error::Result;
use crate::tools::source::ToolSource;

/// How a tagged source appears inside the discovery toolset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressiveConfig {
    /// Group id; defaults to the source id.
    pub group: Option<String>,
    pub description: Option<String>,
}

impl ProgressiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A tool source, optionally tagged for progressive discovery.
#[derive(Clone)]
pub struct Toolset {
    source: Arc<dyn ToolSource>,
    progressive: Option<ProgressiveConfig>,
}

impl Toolset {
    pub fn new(source: Arc<dyn ToolSource>) -> Self {
        Self {
            source,
            progressive: None,
        }
    }

    pub fn progressive(source: Arc<dyn ToolSource>, config: ProgressiveConfig) -> Self {
        Self {
            source,
            progressive: Some(config),
        }
    }

    pub fn source(&self) -> &Arc<dyn ToolSource> {
        &self.source
    }

    pub fn progressive_config(&self) -> Option<&ProgressiveConfig> {
        self.progressive.as_ref()
    }

    pub fn is_progressive(&self) -> bool {
        self.progressive.is_some()
    }
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolset")
            .field("source", &self.source.id())
            .field("progressive", &self.progressive)
            .finish()
    }
}

/// Collect tagged toolsets into one discovery toolset.
///
/// Untagged toolsets pass through unchanged and in order; the discovery
/// toolset, if any source was tagged, comes last.
pub fn merge_progressive(toolsets: Vec<Toolset>) -> Result<Vec<Arc<dyn ToolSource>>> {
    let mut passthrough: Vec<Arc<dyn ToolSource>> = Vec::new();
    let mut grouped: Vec<(String, Arc<dyn ToolSource>)> = Vec::new();
    let mut descriptions: HashMap<String, String> = HashMap::new();

    for toolset in toolsets {
        let Some(config) = toolset.progressive else {
            passthrough.push(toolset.source);
            continue;
        };
        let group = config
            .group
            .unwrap_or_else(|| toolset.source.id().to_string());
        if let Some(description) = config.description {
            descriptions.insert(group.clone(), description);
        }
        grouped.push((group, toolset.source));
    }

    if grouped.is_empty() {
        return Ok(passthrough);
    }
    tracing::debug!(groups = grouped.len(), "merging tagged toolsets into progressive discovery");
    let discovery = ToolDiscoveryToolset::builder()
        .grouped_sources(grouped)
        .group_descriptions(descriptions)
        .build()?;
    passthrough.push(Arc::new(discovery));
    Ok(passthrough)
}

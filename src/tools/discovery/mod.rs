//! Progressive tool discovery.
//!
//! Instead of exposing every tool up front, the model sees four meta-tools
//! and discovers the rest on demand: list or search, inspect schemas, then
//! execute through `call_tools`.

pub mod progressive;
pub mod toolset;

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

pub use progressive::{merge_progressive, ProgressiveConfig, Toolset};
pub use toolset::{ToolCallSpec, ToolDiscoveryToolset};

/// Meta-tools exposed by [`ToolDiscoveryToolset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MetaTool {
    ListTools,
    SearchTools,
    GetToolSchema,
    CallTools,
}

impl MetaTool {
    pub fn names() -> Vec<String> {
        Self::iter().map(|tool| tool.to_string()).collect()
    }

    pub fn is_meta_tool(name: &str) -> bool {
        name.parse::<Self>().is_ok()
    }
}

/// Prompt section explaining the discovery workflow. `{tool_groups}` is
/// replaced with the rendered group listing.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You have access to tools via progressive disclosure.
Use these meta-tools to discover and execute tools on demand:

- `list_tools(group=None)`: list tools grouped by source (optional group filter)
- `search_tools(query, group=None)`: search tools by name/description
  (optional group filter)
- `get_tool_schema(tool_names)`: inspect one or more tool schemas
  (XML-wrapped JSON objects)
- `call_tools(calls)`: execute one or more tools

Use the workflow: discover -> inspect -> execute.
Always pass `arguments` as an object/dictionary, never as a JSON string.
Always pass `calls` as a non-empty list, even for a single tool call.

Correct:
```
call_tools(calls=[{"tool_name":"chart","arguments":{"symbol":"SILJ"}}])
```

Incorrect:
```
call_tools(calls=[
  {"tool_name": "chart", "arguments": "{\"symbol\": \"SILJ\"}"}
])
```

Batch multiple tools in one call when possible:
```
call_tools(calls=[
  {"tool_name": "tool_a", "arguments": {"symbol": "AAPL"}},
  {"tool_name": "tool_b", "arguments": {"symbol": "MSFT"}}
])
```

You can reduce token usage by filtering tools by group, e.g.:
`list_tools(group="openbb_viz_tools")`

<available_tool_groups>
{tool_groups}
</available_tool_groups>
"#;

/// Placeholder every instruction template must contain.
pub const TOOL_GROUPS_PLACEHOLDER: &str = "{tool_groups}";

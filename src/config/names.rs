//! Reserved tool names and side-channel keys shared with the host.

/// Host function that fetches one or more widgets in a single round trip.
pub const GET_WIDGET_DATA: &str = "get_widget_data";
/// Host function that runs a remote (MCP-style) tool.
pub const EXECUTE_AGENT_TOOL: &str = "execute_agent_tool";

pub const CHART_TOOL: &str = "openbb_create_chart";
pub const TABLE_TOOL: &str = "openbb_create_table";
pub const HTML_TOOL: &str = "openbb_create_html";

/// Prefix of every generated widget tool name.
pub const WIDGET_TOOL_PREFIX: &str = "openbb_widget";

pub const LOCAL_TOOL_CAPSULE_KEY: &str = "openbb_local_tool_capsule";
pub const LOCAL_TOOL_REHYDRATED_KEY: &str = "openbb_local_tool_rehydrated";
pub const LOCAL_TOOL_RESULT_KEY: &str = "openbb_local_tool_result";

pub const THINKING_LABEL: &str = "Thinking";

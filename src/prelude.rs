//! Convenience re-exports for common use.

pub use crate::adapter::{BridgeAdapter, BridgeRequest};
pub use crate::capsule::{pack_tool_history, unpack_tool_history, LocalToolEntry};
pub use crate::config::BridgeConfig;
pub use crate::engine::EventStreamEngine;
pub use crate::error::{BridgeError, Result};
pub use crate::registry::{RemoteToolRegistry, WidgetRegistry};
pub use crate::stream::StreamParser;
pub use crate::tools::{
    merge_progressive, ProgressiveConfig, ToolDiscoveryToolset, ToolSource, Toolset,
};
pub use crate::transform::MessageTransformer;
pub use crate::types::{
    Citation, ClientArtifact, FunctionCallResult, HostEvent, HostMessage, ReasoningStep,
    RemoteTool, RunOutput, RuntimeEvent, RuntimeMessage, StepLevel, ToolResultPart, Widget,
    WidgetCollection,
};

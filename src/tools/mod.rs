//! Tool system: local tools, tool sources and progressive discovery.

pub mod arguments;
pub mod discovery;
pub mod source;
pub mod tool;
pub mod types;
pub mod validation;
pub mod viz;

pub use arguments::ToolArguments;
pub use discovery::{
    merge_progressive, MetaTool, ProgressiveConfig, ToolDiscoveryToolset, Toolset,
};
pub use source::{
    DeferredCall, ExternalToolSource, FunctionToolSource, ToolDescriptor, ToolKind, ToolOutcome,
    ToolSource,
};
pub use tool::{FunctionTool, Tool, ToolExecutionContext, ToolReturn};
pub use types::ToolParameters;
pub use validation::validate_arguments;

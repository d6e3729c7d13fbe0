//! Error types for hostbridge.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::capsule::CapsuleError;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("`tool_call_id` is required for deferred tool results but was not found in extra_state of '{function}'")]
    MissingToolCallId { function: String },

    #[error("Not enough tool_call_ids for call to '{function}': needed {needed}, found {available}")]
    InsufficientToolCallIds {
        function: String,
        needed: usize,
        available: usize,
    },

    #[error("Duplicate tool name '{name}' discovered in '{first_group}' and '{second_group}'. Tool names must be unique.")]
    DuplicateTool {
        name: String,
        first_group: String,
        second_group: String,
    },

    #[error("Unknown meta-tools: [{}]. Valid names: [{}]", .unknown.join(", "), .valid.join(", "))]
    UnknownMetaTool {
        unknown: Vec<String>,
        valid: Vec<String>,
    },

    #[error("Tool(s) not found: {}. Available tools include: {}. Run list_tools or search_tools first, then get_tool_schema before calling tools.", .missing.join(", "), .available.join(", "))]
    ToolNotFound {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("The `call_tools` batch mixed deferred tools and immediate tools. Deferred tools: {}. Immediate tools: {}. Split them into separate `call_tools` calls: first run immediate tools together, then run deferred tools together.", .deferred.join(", "), .immediate.join(", "))]
    MixedBatch {
        deferred: Vec<String>,
        immediate: Vec<String>,
    },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Capsule error: {0}")]
    Capsule(#[from] CapsuleError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl BridgeError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Capsule(_) | Self::InvalidArgument(_) => ErrorCategory::MalformedInput,
            Self::MissingToolCallId { .. } | Self::InsufficientToolCallIds { .. } => {
                ErrorCategory::ContractViolation
            }
            Self::DuplicateTool { .. }
            | Self::UnknownMetaTool { .. }
            | Self::ToolNotFound { .. }
            | Self::MixedBatch { .. } => ErrorCategory::DiscoveryConfiguration,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Stream(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the error must abort the request instead of degrading to an event.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::ContractViolation | ErrorCategory::Configuration
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::MalformedInput => RecoverySuggestion::SkipInput,
            ErrorCategory::ContractViolation => RecoverySuggestion::FixHostRequest,
            ErrorCategory::DiscoveryConfiguration => match self {
                Self::DuplicateTool { .. } | Self::UnknownMetaTool { .. } => {
                    RecoverySuggestion::CheckConfiguration
                }
                _ => RecoverySuggestion::RetryWithGuidance,
            },
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::ReportToUser,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;

//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input that is skipped and logged (missing id on replay, bad capsule).
    MalformedInput,
    /// The host broke the history contract; continuing would misattribute results.
    ContractViolation,
    /// A tool failed while running.
    ToolExecution,
    /// Discovery toolset misuse: duplicates, unknown exclusions, mixed batches.
    DiscoveryConfiguration,
    Serialization,
    Configuration,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Drop the offending input and keep streaming.
    SkipInput,
    /// The request must be fixed by the host before it can be served.
    FixHostRequest,
    /// Ask the model to adjust the call (split the batch, discover first).
    RetryWithGuidance,
    CheckToolImplementation,
    CheckConfiguration,
    ReportToUser,
}

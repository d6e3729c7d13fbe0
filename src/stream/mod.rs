//! Streaming primitives: placeholder parsing and per-request state.

pub mod parser;
pub mod state;

pub use parser::StreamParser;
pub use state::{StreamState, ToolCallInfo};

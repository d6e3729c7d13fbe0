//! hostbridge: agent runtime <-> host UI protocol bridge
//!
//! Converts a host's conversation history (messages, widget results and
//! their `extra_state` side channel) into agent runtime call/return history,
//! and converts the runtime's lifecycle events back into the host's
//! server-sent event stream: text, reasoning steps, artifacts, citations and
//! function-call dispatches.
//!
//! # Quick Start
//!
//! ```no_run
//! use hostbridge::prelude::*;
//! use tokio_util::sync::CancellationToken;
//! use futures::StreamExt;
//!
//! # async fn example(body: &str) -> hostbridge::error::Result<()> {
//! let adapter = BridgeAdapter::from_json(body, BridgeConfig::from_env()?)?;
//! let history = adapter.messages();
//! let toolsets = adapter.toolsets()?;
//! let instructions = adapter.instructions().await?;
//! # let _ = (history, toolsets, instructions);
//!
//! // Feed the runtime's events through the engine.
//! let runtime_events = futures::stream::iter(Vec::<Result<RuntimeEvent>>::new());
//! let mut out = adapter.event_stream().run(runtime_events, CancellationToken::new());
//! while let Some(event) = out.next().await {
//!     print!("{}", event.to_sse()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod capsule;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod stream;
pub mod tools;
pub mod transform;
pub mod types;
pub mod util;

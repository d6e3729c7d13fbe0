//! Core types: host protocol, runtime vocabulary, widgets.

pub mod events;
pub mod host;
pub mod runtime;
pub mod widget;

pub use events::*;
pub use host::*;
pub use runtime::*;
pub use widget::*;

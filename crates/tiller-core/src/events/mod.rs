//! Normalized session events and the mapping from raw engine output.

pub mod mapper;
pub mod raw;

use serde::Serialize;

pub use mapper::map_raw_event;
pub use raw::{ContentPart, RawEvent, ShellAction, SummaryText, ToolCallItem};

/// The event vocabulary every front end consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolCall { name: String, arguments: String },
    Reasoning { text: String },
    MessageOutput { text: String },
    Error { message: String },
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event as emitted by the reasoning engine.
///
/// Only the shapes the session cares about are modelled; everything else
/// lands in [`RawEvent::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    ToolCalled {
        item: ToolCallItem,
    },
    ReasoningItemCreated {
        #[serde(default)]
        summary: Vec<SummaryText>,
    },
    MessageOutputCreated {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Unrecognized,
}

impl RawEvent {
    /// Parse an engine event, degrading anything malformed to `Unrecognized`.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(RawEvent::Unrecognized)
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        RawEvent::ToolCalled {
            item: ToolCallItem::FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        RawEvent::ReasoningItemCreated {
            summary: vec![SummaryText { text: text.into() }],
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        RawEvent::MessageOutputCreated {
            content: vec![ContentPart::OutputText { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText { text: String },
    Refusal { refusal: String },
}

impl ContentPart {
    pub fn text(&self) -> &str {
        match self {
            ContentPart::OutputText { text } => text,
            ContentPart::Refusal { refusal } => refusal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellAction {
    #[serde(default)]
    pub command: Vec<String>,
}

/// The capability invocation carried by a `tool_called` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallItem {
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: String,
    },
    McpCall {
        name: String,
        #[serde(default)]
        arguments: String,
    },
    LocalShellCall {
        action: ShellAction,
    },
    FileSearchCall {
        #[serde(default)]
        queries: Vec<String>,
    },
    WebSearchCall {
        #[serde(default)]
        query: Option<String>,
        #[serde(default)]
        queries: Vec<String>,
    },
    CodeInterpreterCall {
        #[serde(default)]
        code: String,
    },
    ComputerCall {
        #[serde(default)]
        action: Value,
    },
    #[serde(other)]
    Unknown,
}

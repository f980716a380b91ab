//! Progress events emitted while a turn runs.
//!
//! The loop sends these to an optional `mpsc` sink; the gateway turns them
//! into streamed status updates.

use serde::{Deserialize, Serialize};
use statecraft_core::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A planning step started.
    Planning { iteration: usize },

    /// The model asked for a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// A tool finished and its observation was recorded.
    ToolResult {
        id: String,
        name: String,
        success: bool,
        output: String,
    },

    /// `data` changed; the new revision is committed.
    StateChanged { revision: u64 },

    /// The task paused for user input.
    Interrupted { question: String },

    /// The turn ended with this status.
    Finished { status: TaskStatus },
}

impl TurnEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::StateChanged { .. } => "state_changed",
            Self::Interrupted { .. } => "interrupted",
            Self::Finished { .. } => "finished",
        }
    }
}

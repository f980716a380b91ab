//! Turn boundary types: what comes in, what goes out, and how a paused
//! task can be carried elsewhere.

use serde::{Deserialize, Serialize};
use statecraft_core::message::{Message, Role};
use statecraft_core::task::TaskStatus;
use statecraft_state::StateSnapshot;

/// One external input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    pub content: String,
}

impl InboundMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A request to run one turn.
///
/// Without `task_id` a new task is started (under `context_id`, or a fresh
/// context). With `task_id` the task must exist and be awaiting input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: InboundMessage,
}

impl TurnRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            context_id: None,
            task_id: None,
            message: InboundMessage::user(content),
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// The status-bearing result of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub context_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    /// The answer, the question being asked, or the failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_artifact: Option<StateSnapshot>,
}

impl TurnOutcome {
    /// Text of the final message, or `""`.
    pub fn text(&self) -> &str {
        self.final_message
            .as_ref()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Everything needed to resume a task that is awaiting input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeToken {
    pub context_id: String,
    pub task_id: String,
    pub snapshot: StateSnapshot,
    /// The outstanding question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builder() {
        let req = TurnRequest::new("hi").with_context("c1").with_task("t1");
        assert_eq!(req.context_id.as_deref(), Some("c1"));
        assert_eq!(req.task_id.as_deref(), Some("t1"));
        assert_eq!(req.message.role, Role::User);
    }

    #[test]
    fn resume_token_survives_serialization() {
        let token = ResumeToken {
            context_id: "c1".into(),
            task_id: "t1".into(),
            snapshot: StateSnapshot {
                revision: 3,
                messages: vec![Message::user("hi")],
                data: json!({"count": 1}),
            },
            pending: Some(Message::agent("Which city?")),
        };
        let wire = serde_json::to_string(&token).unwrap();
        assert!(wire.contains("\"contextId\":\"c1\""));
        let back: ResumeToken = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, token);
    }
}

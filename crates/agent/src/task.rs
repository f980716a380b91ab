//! A single task: its state document, interrupt slot and lifecycle status.

use crate::turn::ResumeToken;
use chrono::{DateTime, Utc};
use statecraft_core::message::Message;
use statecraft_core::task::TaskStatus;
use statecraft_state::{AgentStateDocument, StateSnapshot};
use statecraft_tools::InterruptSlot;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};

/// The mutable part of a task, owned by whichever turn holds the lock.
#[derive(Debug)]
pub struct TaskInstance {
    pub context_id: String,
    pub task_id: String,
    pub document: AgentStateDocument,
    pub interrupt: InterruptSlot,
}

impl TaskInstance {
    pub fn new(context_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            task_id: task_id.into(),
            document: AgentStateDocument::new(),
            interrupt: InterruptSlot::new(),
        }
    }
}

/// The latest status of a task, as published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub status: TaskStatus,
    /// The answer, question, or failure reason that came with the status.
    pub message: Option<Message>,
    pub timestamp: DateTime<Utc>,
}

impl StatusRecord {
    fn new(status: TaskStatus, message: Option<Message>) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Shared handle to a task.
///
/// Turns serialize on the instance lock. Status and committed snapshots are
/// published on `watch` channels so readers never wait for a running turn.
pub struct TaskHandle {
    context_id: String,
    task_id: String,
    seq: u64,
    status: watch::Sender<StatusRecord>,
    snapshot: watch::Receiver<Arc<StateSnapshot>>,
    instance: Mutex<TaskInstance>,
}

impl TaskHandle {
    pub(crate) fn new(context_id: String, task_id: String, seq: u64) -> Self {
        let instance = TaskInstance::new(context_id.clone(), task_id.clone());
        Self::from_instance(instance, TaskStatus::Submitted, None, seq)
    }

    /// Rebuild a task that was awaiting input from its resume token.
    pub(crate) fn restore(token: ResumeToken, seq: u64) -> Self {
        let mut instance = TaskInstance {
            context_id: token.context_id,
            task_id: token.task_id,
            document: AgentStateDocument::from_snapshot(token.snapshot),
            interrupt: InterruptSlot::new(),
        };
        if let Some(question) = &token.pending {
            // A fresh slot accepts any agent message; a bad payload just
            // leaves the task without a pending question.
            let _ = instance.interrupt.raise(question.clone());
            instance.interrupt.take_violation();
        }
        Self::from_instance(instance, TaskStatus::InputRequired, token.pending, seq)
    }

    fn from_instance(
        instance: TaskInstance,
        status: TaskStatus,
        message: Option<Message>,
        seq: u64,
    ) -> Self {
        let (status, _) = watch::channel(StatusRecord::new(status, message));
        Self {
            context_id: instance.context_id.clone(),
            task_id: instance.task_id.clone(),
            seq,
            status,
            snapshot: instance.document.subscribe(),
            instance: Mutex::new(instance),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Creation order within the registry.
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> TaskStatus {
        self.status.borrow().status
    }

    pub fn status_record(&self) -> StatusRecord {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusRecord> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: TaskStatus, message: Option<Message>) {
        self.status.send_replace(StatusRecord::new(status, message));
    }

    /// The last committed state, without waiting for a running turn.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub async fn lock(&self) -> MutexGuard<'_, TaskInstance> {
        self.instance.lock().await
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, TaskInstance>> {
        self.instance.try_lock().ok()
    }

    /// Serializable resume data, available while the task awaits input.
    pub async fn resume_token(&self) -> Option<ResumeToken> {
        let instance = self.lock().await;
        if self.status() != TaskStatus::InputRequired {
            return None;
        }
        Some(ResumeToken {
            context_id: self.context_id.clone(),
            task_id: self.task_id.clone(),
            snapshot: instance.document.snapshot().as_ref().clone(),
            pending: instance.interrupt.pending().cloned(),
        })
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("context_id", &self.context_id)
            .field("task_id", &self.task_id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statecraft_state::parse_patch;

    #[tokio::test]
    async fn snapshot_tracks_commits_without_the_lock() {
        let handle = TaskHandle::new("c1".into(), "t1".into(), 0);
        assert_eq!(handle.status(), TaskStatus::Submitted);
        assert_eq!(handle.snapshot().revision, 0);

        let mut instance = handle.lock().await;
        let ops = parse_patch(&json!([{"op": "add", "path": "/n", "value": 1}])).unwrap();
        instance.document.apply_patch(&ops).unwrap();

        // Readable while the turn still holds the instance
        assert_eq!(handle.snapshot().data, json!({"n": 1}));
        assert!(handle.try_lock().is_none());
    }

    #[tokio::test]
    async fn resume_token_round_trip() {
        let handle = TaskHandle::new("c1".into(), "t1".into(), 0);
        {
            let mut instance = handle.lock().await;
            instance.document.append_message(Message::user("weather?"));
            instance.interrupt.raise(Message::agent("Which city?")).unwrap();
        }
        assert!(handle.resume_token().await.is_none());

        handle.set_status(TaskStatus::InputRequired, Some(Message::agent("Which city?")));
        let token = handle.resume_token().await.unwrap();
        assert_eq!(token.snapshot.messages.len(), 1);

        let restored = TaskHandle::restore(token, 1);
        assert_eq!(restored.status(), TaskStatus::InputRequired);
        let instance = restored.lock().await;
        assert_eq!(instance.interrupt.pending().unwrap().content, "Which city?");
        assert_eq!(instance.document.messages()[0].content, "weather?");
    }
}

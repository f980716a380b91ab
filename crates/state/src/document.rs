//! The per-task agent state document.
//!
//! Holds the canonical message history and the free-form `data` value. Only
//! the task that owns the document mutates it (`&mut self`); every commit
//! publishes an immutable [`StateSnapshot`] on a `watch` channel so readers
//! outside the task only ever observe committed state.

use crate::error::Result;
use crate::patch::{self, PatchOperation, PatchOutcome};
use crate::path::JsonPath;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use statecraft_core::message::{Message, Role};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// An immutable, committed view of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub revision: u64,
    pub messages: Vec<Message>,
    pub data: Value,
}

impl StateSnapshot {
    /// The value path queries are evaluated against: `{messages, data}`.
    pub fn view(&self) -> Value {
        json!({ "messages": self.messages, "data": self.data })
    }

    /// Evaluate a path expression against this snapshot.
    pub fn query(&self, expression: &str) -> Result<Vec<OwnedMatch>> {
        query_view(&self.view(), expression)
    }
}

fn query_view(view: &Value, expression: &str) -> Result<Vec<OwnedMatch>> {
    let path = JsonPath::parse(expression)?;
    Ok(path
        .evaluate(view)
        .into_iter()
        .map(|m| OwnedMatch {
            pointer: m.pointer.to_string(),
            value: m.value.clone(),
        })
        .collect())
}

/// A query match detached from the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedMatch {
    /// Location within the `{messages, data}` view, e.g. `/data/count`.
    pub pointer: String,
    pub value: Value,
}

impl OwnedMatch {
    /// The location relative to `data`, usable as a patch path.
    pub fn data_pointer(&self) -> Option<&str> {
        match self.pointer.strip_prefix("/data") {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

pub struct AgentStateDocument {
    messages: Vec<Message>,
    data: Value,
    revision: u64,
    publisher: watch::Sender<Arc<StateSnapshot>>,
}

impl AgentStateDocument {
    /// A fresh document: no messages, `data = {}`, revision 0.
    pub fn new() -> Self {
        Self::with_data(json!({}))
    }

    pub fn with_data(data: Value) -> Self {
        Self::from_snapshot(StateSnapshot {
            revision: 0,
            messages: Vec::new(),
            data,
        })
    }

    /// Rebuild a document from a previously committed snapshot.
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let StateSnapshot {
            revision,
            messages,
            data,
        } = snapshot.clone();
        let (publisher, _) = watch::channel(Arc::new(snapshot));
        Self {
            messages,
            data,
            revision,
            publisher,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a message to the history and commit.
    ///
    /// System messages belong to provider requests only and are dropped.
    pub fn append_message(&mut self, message: Message) -> u64 {
        if message.role == Role::System {
            warn!("system messages are not stored in the state document");
            return self.revision;
        }
        self.messages.push(message);
        self.commit()
    }

    /// Apply a patch list to `data`, atomically.
    ///
    /// On error `data` and the revision are unchanged. An empty list is a
    /// no-op that does not bump the revision.
    pub fn apply_patch(&mut self, operations: &[PatchOperation]) -> Result<PatchOutcome> {
        if operations.is_empty() {
            return Ok(PatchOutcome::new(operations, self.revision));
        }
        self.data = patch::apply(&self.data, operations)?;
        let revision = self.commit();
        debug!(revision, operations = operations.len(), "patch committed");
        Ok(PatchOutcome::new(operations, revision))
    }

    /// Evaluate a path expression against the current `{messages, data}`.
    pub fn query(&self, expression: &str) -> Result<Vec<OwnedMatch>> {
        query_view(
            &json!({ "messages": self.messages, "data": self.data }),
            expression,
        )
    }

    /// The latest committed snapshot.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Receive every future commit.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.publisher.subscribe()
    }

    fn commit(&mut self) -> u64 {
        self.revision += 1;
        let snapshot = StateSnapshot {
            revision: self.revision,
            messages: self.messages.clone(),
            data: self.data.clone(),
        };
        self.publisher.send_replace(Arc::new(snapshot));
        self.revision
    }
}

impl Default for AgentStateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentStateDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStateDocument")
            .field("revision", &self.revision)
            .field("messages", &self.messages.len())
            .field("data", &self.data)
            .finish()
    }
}

//! The interrupt slot of a running task.
//!
//! A tool that needs the user to answer before the task can go on raises an
//! interrupt with an agent message. At most one interrupt may be outstanding,
//! and a rejected raise is remembered so the reasoning loop can fail the task
//! even if the tool swallowed the error.

use serde::{Deserialize, Serialize};
use statecraft_core::message::{Message, Role};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InterruptError {
    #[error("an interrupt is already outstanding for this task")]
    MultipleInterrupts,

    #[error("interrupt payload must be an agent message, got a {0} message")]
    InvalidInterruptPayload(Role),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptSlot {
    pending: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    violation: Option<InterruptError>,
}

impl InterruptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an interrupt carrying `payload`.
    pub fn raise(&mut self, payload: Message) -> Result<(), InterruptError> {
        let verdict = if self.pending.is_some() {
            Err(InterruptError::MultipleInterrupts)
        } else if payload.role != Role::Agent {
            Err(InterruptError::InvalidInterruptPayload(payload.role))
        } else {
            self.pending = Some(payload);
            Ok(())
        };
        if let Err(violation) = &verdict {
            self.violation.get_or_insert(violation.clone());
        }
        verdict
    }

    pub fn pending(&self) -> Option<&Message> {
        self.pending.as_ref()
    }

    pub fn is_raised(&self) -> bool {
        self.pending.is_some()
    }

    /// Clear the outstanding interrupt, e.g. when the user answers.
    pub fn take(&mut self) -> Option<Message> {
        self.pending.take()
    }

    /// The first rejected raise since the last call, if any.
    pub fn take_violation(&mut self) -> Option<InterruptError> {
        self.violation.take()
    }
}

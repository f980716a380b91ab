//! The Statecraft agent: a ReAct reasoning loop over a per-task state
//! document, and the layer that correlates incoming turns with tasks.
//!
//! 1. **Resolve** the task a turn belongs to ([`TaskRegistry`])
//! 2. **Plan**: send the system prompt, history window and tool schema to the provider
//! 3. **Act**: run the requested tools against the task's state document
//! 4. **Loop** until the model answers, asks the user a question, or fails
//!
//! A task waiting for input keeps its document and pending question; the
//! next turn on the same `(context_id, task_id)` continues it.

pub mod error;
pub mod events;
pub mod react;
pub mod registry;
pub mod runner;
pub mod task;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{AgentError, TaskError};
pub use events::TurnEvent;
pub use react::{LoopState, ReactAgent, TurnEnd};
pub use registry::TaskRegistry;
pub use runner::{GREETING, TaskRunner};
pub use task::{StatusRecord, TaskHandle, TaskInstance};
pub use turn::{InboundMessage, ResumeToken, TurnOutcome, TurnRequest};

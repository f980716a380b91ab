//! # Statecraft Core
//!
//! Domain types, traits, and error definitions shared by every Statecraft
//! crate. Nothing in here knows about HTTP, configuration files, or a
//! concrete language model; it is the vocabulary the other crates speak.
//!
//! - [`message`]: conversation records stored in the agent state document
//! - [`provider`]: the opaque "generate the next action" capability
//! - [`tool`]: tool call requests and observations
//! - [`task`]: task lifecycle status shared by the agent and the gateway
//! - [`event`]: broadcast bus for domain events

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use task::TaskStatus;
pub use tool::{ToolCall, ToolResult};

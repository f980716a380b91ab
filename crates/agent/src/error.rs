//! Errors raised while running turns and resolving tasks.

use statecraft_core::error::ProviderError;
use statecraft_core::task::TaskStatus;
use statecraft_tools::InterruptError;
use thiserror::Error;

/// Why a turn failed. Every variant moves the task to `failed`.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("generation failed: {0}")]
    GenerationFailure(#[from] ProviderError),

    #[error("no final answer after {0} planning steps")]
    IterationLimit(usize),

    #[error("interrupt contract violated: {0}")]
    Interrupt(#[from] InterruptError),

    #[error("turn timed out after {0}s")]
    Timeout(u64),
}

/// Caller protocol errors. The request is rejected and the task untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task {task_id} is already {status}; send new input under a new task id")]
    TaskAlreadyTerminal { task_id: String, status: TaskStatus },

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("task {task_id} belongs to context {expected}, not {actual}")]
    ContextMismatch {
        task_id: String,
        expected: String,
        actual: String,
    },

    #[error("task {task_id} cannot be canceled while {status}")]
    TaskNotCancelable { task_id: String, status: TaskStatus },
}

pub type Result<T> = std::result::Result<T, TaskError>;

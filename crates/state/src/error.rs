//! Errors raised by the path and patch engines.
//!
//! All of these are recoverable: the tool adapters turn them into
//! observations for the model instead of failing the task.

use crate::patch::OpKind;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("invalid path expression '{expression}' at offset {offset}: {reason}")]
    InvalidPathExpression {
        expression: String,
        offset: usize,
        reason: String,
    },

    #[error("operation {index} ({op}): invalid pointer '{pointer}': {reason}")]
    InvalidPointer {
        index: usize,
        op: OpKind,
        pointer: String,
        reason: String,
    },

    #[error("operation {index} ({op}): path not found: {path}")]
    PathNotFound {
        index: usize,
        op: OpKind,
        path: String,
    },

    #[error("operation {index} (test): value at '{path}' is {actual}, expected {expected}")]
    PatchTestFailed {
        index: usize,
        path: String,
        expected: Value,
        actual: Value,
    },

    #[error("operation {index} ({op}): {reason}")]
    InvalidPatch {
        index: usize,
        op: OpKind,
        reason: String,
    },

    #[error("malformed patch: {0}")]
    MalformedPatch(String),
}

impl StateError {
    /// Index of the failing operation, for patch errors.
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            Self::InvalidPointer { index, .. }
            | Self::PathNotFound { index, .. }
            | Self::PatchTestFailed { index, .. }
            | Self::InvalidPatch { index, .. } => Some(*index),
            Self::InvalidPathExpression { .. } | Self::MalformedPatch(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;

//! RFC 6902 JSON Patch, applied atomically.
//!
//! [`apply`] works on a clone of the document and only hands back the result
//! once every operation has succeeded, so a failing list leaves the caller's
//! value untouched.

use crate::error::{Result, StateError};
use crate::pointer::{JsonPointer, PointerError, parse_array_index};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// The operation kinds of RFC 6902.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Move => "move",
            OpKind::Copy => "copy",
            OpKind::Test => "test",
        })
    }
}

/// One patch operation, in its wire shape `{op, path, value?, from?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Add { .. } => OpKind::Add,
            Self::Remove { .. } => OpKind::Remove,
            Self::Replace { .. } => OpKind::Replace,
            Self::Move { .. } => OpKind::Move,
            Self::Copy { .. } => OpKind::Copy,
            Self::Test { .. } => OpKind::Test,
        }
    }

    /// The target path of the operation.
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Move { from, path } | Self::Copy { from, path } => {
                format!("{} {} (from {})", self.kind(), display_path(path), display_path(from))
            }
            _ => format!("{} {}", self.kind(), display_path(self.path())),
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

/// Summary of a committed patch list, reported back to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    /// Document revision after the commit.
    pub revision: u64,
    /// Number of operations applied.
    pub applied: usize,
    pub summary: String,
}

impl PatchOutcome {
    pub fn new(operations: &[PatchOperation], revision: u64) -> Self {
        let summary = if operations.is_empty() {
            "No operations to apply".to_string()
        } else {
            let steps: Vec<String> = operations.iter().map(PatchOperation::describe).collect();
            format!(
                "Applied {} operation(s) (revision {revision}): {}",
                operations.len(),
                steps.join(", ")
            )
        };
        Self {
            revision,
            applied: operations.len(),
            summary,
        }
    }
}

/// Parse a patch list from a tool argument.
///
/// Accepts a JSON array of operation objects, or a string holding one
/// (models often stringify nested arguments). Anything else is
/// [`StateError::MalformedPatch`].
pub fn parse_patch(argument: &Value) -> Result<Vec<PatchOperation>> {
    let list = match argument {
        Value::String(text) => Cow::Owned(serde_json::from_str::<Value>(text).map_err(|e| {
            StateError::MalformedPatch(format!("patch string is not valid JSON: {e}"))
        })?),
        other => Cow::Borrowed(other),
    };
    let Value::Array(items) = list.as_ref() else {
        return Err(StateError::MalformedPatch(format!(
            "expected an array of operations, got {}",
            kind_of(&list)
        )));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            PatchOperation::deserialize(item)
                .map_err(|e| StateError::MalformedPatch(format!("operation {index}: {e}")))
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Apply `operations` left to right to a copy of `document`.
///
/// Returns the patched copy, or the first failure tagged with the index and
/// kind of the operation that caused it.
pub fn apply(document: &Value, operations: &[PatchOperation]) -> Result<Value> {
    let mut working = document.clone();
    for (index, operation) in operations.iter().enumerate() {
        apply_one(&mut working, operation).map_err(|fault| fault.at(index, operation))?;
    }
    Ok(working)
}

/// Failure of a single operation, before it is tagged with its position.
enum Fault {
    Pointer { pointer: String, reason: String },
    NotFound(String),
    TestFailed { expected: Value, actual: Value },
    Invalid(String),
}

impl Fault {
    fn pointer(raw: &str, err: PointerError) -> Self {
        Fault::Pointer {
            pointer: raw.to_string(),
            reason: err.reason,
        }
    }

    fn at(self, index: usize, operation: &PatchOperation) -> StateError {
        let op = operation.kind();
        match self {
            Fault::Pointer { pointer, reason } => StateError::InvalidPointer {
                index,
                op,
                pointer,
                reason,
            },
            Fault::NotFound(path) => StateError::PathNotFound { index, op, path },
            Fault::TestFailed { expected, actual } => StateError::PatchTestFailed {
                index,
                path: operation.path().to_string(),
                expected,
                actual,
            },
            Fault::Invalid(reason) => StateError::InvalidPatch { index, op, reason },
        }
    }
}

type Step<T> = std::result::Result<T, Fault>;

fn apply_one(document: &mut Value, operation: &PatchOperation) -> Step<()> {
    match operation {
        PatchOperation::Add { path, value } => add(document, &parse(path)?, path, value.clone()),
        PatchOperation::Remove { path } => remove(document, &parse(path)?, path).map(drop),
        PatchOperation::Replace { path, value } => {
            let slot = parse(path)?
                .get_mut(document)
                .map_err(|e| Fault::pointer(path, e))?
                .ok_or_else(|| Fault::NotFound(path.clone()))?;
            *slot = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            let source = parse(from)?;
            let target = parse(path)?;
            if source == target {
                lookup(document, &source, from)?;
                return Ok(());
            }
            if target.starts_with(&source) {
                return Err(Fault::Invalid(format!(
                    "cannot move '{from}' into its own child '{path}'"
                )));
            }
            let value = remove(document, &source, from)?;
            add(document, &target, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = lookup(document, &parse(from)?, from)?.clone();
            add(document, &parse(path)?, path, value)
        }
        PatchOperation::Test { path, value } => {
            let actual = lookup(document, &parse(path)?, path)?;
            if json_equal(actual, value) {
                Ok(())
            } else {
                Err(Fault::TestFailed {
                    expected: value.clone(),
                    actual: actual.clone(),
                })
            }
        }
    }
}

fn parse(raw: &str) -> Step<JsonPointer> {
    JsonPointer::parse(raw).map_err(|e| Fault::pointer(raw, e))
}

fn lookup<'a>(document: &'a Value, pointer: &JsonPointer, raw: &str) -> Step<&'a Value> {
    pointer
        .get(document)
        .map_err(|e| Fault::pointer(raw, e))?
        .ok_or_else(|| Fault::NotFound(raw.to_string()))
}

fn add(document: &mut Value, target: &JsonPointer, raw: &str, value: Value) -> Step<()> {
    let Some((parent, last)) = target.split_last() else {
        *document = value;
        return Ok(());
    };
    let container = parent
        .get_mut(document)
        .map_err(|e| Fault::pointer(raw, e))?
        .ok_or_else(|| Fault::NotFound(raw.to_string()))?;
    match container {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_array_index(last).map_err(|e| Fault::pointer(raw, e))?;
            if index > items.len() {
                return Err(Fault::Invalid(format!(
                    "array index {index} is out of bounds for length {}",
                    items.len()
                )));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(Fault::Invalid(format!(
            "parent of '{raw}' is not an object or array"
        ))),
    }
}

fn remove(document: &mut Value, target: &JsonPointer, raw: &str) -> Step<Value> {
    let Some((parent, last)) = target.split_last() else {
        return Err(Fault::Invalid("cannot remove the document root".into()));
    };
    let container = parent
        .get_mut(document)
        .map_err(|e| Fault::pointer(raw, e))?
        .ok_or_else(|| Fault::NotFound(raw.to_string()))?;
    let removed = match container {
        Value::Object(map) => map.shift_remove(last),
        Value::Array(items) if last != "-" => {
            let index = parse_array_index(last).map_err(|e| Fault::pointer(raw, e))?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    };
    removed.ok_or_else(|| Fault::NotFound(raw.to_string()))
}

/// Structural JSON equality with numbers compared by value, so `1` equals
/// `1.0`.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                i == j
            } else if let (Some(i), Some(j)) = (x.as_u64(), y.as_u64()) {
                i == j
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| json_equal(l, r)))
        }
        _ => a == b,
    }
}

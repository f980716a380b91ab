//! # Statecraft State
//!
//! The agent state document and the two engines that operate on it:
//!
//! - [`path`]: JSONPath queries over the `{messages, data}` view
//! - [`patch`]: RFC 6902 patch lists applied atomically to `data`
//! - [`pointer`]: RFC 6901 JSON Pointers shared by both
//! - [`document`]: the per-task document that publishes committed snapshots
//!
//! ```
//! use statecraft_state::{AgentStateDocument, parse_patch};
//! use serde_json::json;
//!
//! let mut doc = AgentStateDocument::new();
//! let ops = parse_patch(&json!([{"op": "add", "path": "/count", "value": 1}])).unwrap();
//! doc.apply_patch(&ops).unwrap();
//! let hits = doc.query("$.data.count").unwrap();
//! assert_eq!(hits[0].value, json!(1));
//! ```

pub mod document;
pub mod error;
pub mod patch;
pub mod path;
pub mod pointer;

pub use document::{AgentStateDocument, OwnedMatch, StateSnapshot};
pub use error::{Result, StateError};
pub use patch::{OpKind, PatchOperation, PatchOutcome, apply, parse_patch};
pub use path::{JsonPath, QueryMatch, query};
pub use pointer::JsonPointer;

//! `state_modify` — edit `data` with a JSON Patch list.

use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use statecraft_core::error::ToolError;
use statecraft_core::tool::ToolResult;
use statecraft_state::parse_patch;
use tracing::{debug, warn};

pub struct StateModifyTool;

#[async_trait]
impl Tool for StateModifyTool {
    fn name(&self) -> &str {
        "state_modify"
    }

    fn description(&self) -> &str {
        "Modify your working state (`data`) with a JSON Patch (RFC 6902) list. Paths are \
         JSON Pointers relative to `data`, e.g. `/count` or `/todo/-`. Operations: add, \
         remove, replace, move, copy, test. The list is applied atomically: if any \
         operation fails, nothing changes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "patch": {
                    "description": "Array of patch operations, e.g. [{\"op\": \"add\", \"path\": \"/count\", \"value\": 1}]",
                    "oneOf": [
                        {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "op": { "type": "string", "enum": ["add", "remove", "replace", "move", "copy", "test"] },
                                    "path": { "type": "string" },
                                    "from": { "type": "string" },
                                    "value": {}
                                },
                                "required": ["op", "path"]
                            }
                        },
                        { "type": "string" }
                    ]
                }
            },
            "required": ["patch"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let Some(raw) = arguments.get("patch") else {
            return Err(ToolError::InvalidArguments("Missing 'patch' argument".into()));
        };

        let outcome = parse_patch(raw).and_then(|ops| ctx.document.apply_patch(&ops));
        match outcome {
            Ok(outcome) => {
                debug!(revision = outcome.revision, applied = outcome.applied, "state modified");
                let output = format!("{}\nCurrent data: {}", outcome.summary, ctx.document.data());
                Ok(ToolResult::ok(ctx.call_id, output).with_data(json!({
                    "revision": outcome.revision,
                    "applied": outcome.applied,
                    "data": ctx.document.data(),
                })))
            }
            Err(e) => {
                warn!(error = %e, "patch rejected");
                Ok(ToolResult::failure(ctx.call_id, e))
            }
        }
    }
}

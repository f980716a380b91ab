//! `get_current_time` — the current UTC time.

use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use statecraft_core::error::ToolError;
use statecraft_core::tool::ToolResult;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time (UTC, RFC 3339)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let now = Utc::now();
        Ok(
            ToolResult::ok(ctx.call_id, now.to_rfc3339_opts(SecondsFormat::Secs, true))
                .with_data(json!({ "unix": now.timestamp() })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptSlot;
    use statecraft_state::AgentStateDocument;

    #[tokio::test]
    async fn returns_rfc3339() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "t1");
        let result = CurrentTimeTool.execute(json!({}), &mut ctx).await.unwrap();
        assert!(result.success);
        assert!(chrono::DateTime::parse_from_rfc3339(&result.output).is_ok());
        assert!(result.output.ends_with('Z'));
    }
}

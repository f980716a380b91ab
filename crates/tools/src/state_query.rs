//! `state_query` — read the agent state with a JSONPath expression.

use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use statecraft_core::error::ToolError;
use statecraft_core::tool::ToolResult;
use tracing::debug;

pub struct StateQueryTool;

#[async_trait]
impl Tool for StateQueryTool {
    fn name(&self) -> &str {
        "state_query"
    }

    fn description(&self) -> &str {
        "Query the agent state with a JSONPath expression. The root `$` is an object with \
         `messages` (the conversation so far) and `data` (your free-form working state), \
         e.g. `$.data.todo[*].title` or `$.messages[-1].content`."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "JSONPath expression, e.g. '$.data.count'"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let matches = match ctx.document.query(path) {
            Ok(matches) => matches,
            Err(e) => return Ok(ToolResult::failure(ctx.call_id, e)),
        };
        debug!(path, matches = matches.len(), "state queried");

        if matches.is_empty() {
            return Ok(ToolResult::ok(
                ctx.call_id,
                format!("No matches found for {path}"),
            ));
        }

        let output = match matches.as_slice() {
            [single] => single.value.to_string(),
            many => json!(many.iter().map(|m| &m.value).collect::<Vec<_>>()).to_string(),
        };
        Ok(ToolResult::ok(ctx.call_id, output).with_data(json!({ "matches": matches })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptSlot;
    use statecraft_core::message::Message;
    use statecraft_state::{AgentStateDocument, parse_patch};

    async fn run(doc: &mut AgentStateDocument, path: &str) -> ToolResult {
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(doc, &mut slot, "q1");
        StateQueryTool
            .execute(json!({ "path": path }), &mut ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_match_returns_value() {
        let mut doc = AgentStateDocument::new();
        doc.apply_patch(&parse_patch(&json!([{"op": "add", "path": "/count", "value": 1}])).unwrap())
            .unwrap();
        let result = run(&mut doc, "$.data.count").await;
        assert!(result.success);
        assert_eq!(result.output, "1");
        assert_eq!(result.data.unwrap()["matches"][0]["pointer"], "/data/count");
    }

    #[tokio::test]
    async fn several_matches_return_array() {
        let mut doc = AgentStateDocument::new();
        doc.append_message(Message::user("a"));
        doc.append_message(Message::agent("b"));
        let result = run(&mut doc, "$.messages[*].content").await;
        assert_eq!(result.output, r#"["a","b"]"#);
    }

    #[tokio::test]
    async fn no_match_is_reported() {
        let mut doc = AgentStateDocument::new();
        let result = run(&mut doc, "$.data.nothing").await;
        assert!(result.success);
        assert_eq!(result.output, "No matches found for $.data.nothing");
    }

    #[tokio::test]
    async fn invalid_path_is_a_failed_observation() {
        let mut doc = AgentStateDocument::new();
        let result = run(&mut doc, "data.count").await;
        assert!(!result.success);
        assert!(result.output.starts_with("Error:"));
        assert!(result.output.contains("invalid path expression"));
    }

    #[tokio::test]
    async fn missing_argument_is_an_error() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "q1");
        let err = StateQueryTool.execute(json!({}), &mut ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

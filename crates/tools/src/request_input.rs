//! `request_input` — pause the task until the user answers a question.

use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use statecraft_core::error::ToolError;
use statecraft_core::message::Message;
use statecraft_core::tool::ToolResult;
use tracing::info;

pub struct RequestInputTool;

#[async_trait]
impl Tool for RequestInputTool {
    fn name(&self) -> &str {
        "request_input"
    }

    fn description(&self) -> &str {
        "Ask the user a question and wait for their reply. Use this when you cannot \
         continue without more information. The task pauses until the user answers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to show the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let question = arguments["question"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'question' argument".into()))?;

        match ctx.interrupt.raise(Message::agent(question)) {
            Ok(()) => {
                info!(call_id = ctx.call_id, "input requested from user");
                Ok(ToolResult::ok(
                    ctx.call_id,
                    format!("Awaiting user input: {question}"),
                ))
            }
            Err(e) => Ok(ToolResult::failure(ctx.call_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{InterruptError, InterruptSlot};
    use statecraft_state::AgentStateDocument;

    #[tokio::test]
    async fn raises_interrupt() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "r1");
        let result = RequestInputTool
            .execute(json!({"question": "Which city?"}), &mut ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(slot.pending().unwrap().content, "Which city?");
    }

    #[tokio::test]
    async fn second_request_records_violation() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        for id in ["r1", "r2"] {
            let mut ctx = ToolContext::new(&mut doc, &mut slot, id);
            RequestInputTool
                .execute(json!({"question": id}), &mut ctx)
                .await
                .unwrap();
        }
        assert_eq!(slot.take_violation(), Some(InterruptError::MultipleInterrupts));
        assert_eq!(slot.pending().unwrap().content, "r1");
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "r1");
        let err = RequestInputTool
            .execute(json!({"question": "  "}), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(!slot.is_raised());
    }
}

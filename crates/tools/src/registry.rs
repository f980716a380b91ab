//! The `Tool` trait and the lookup table the reasoning loop dispatches through.

use crate::interrupt::InterruptSlot;
use async_trait::async_trait;
use statecraft_core::error::ToolError;
use statecraft_core::provider::ToolDefinition;
use statecraft_core::tool::{ToolCall, ToolResult};
use statecraft_state::AgentStateDocument;
use std::collections::HashMap;

/// Exclusive handle a tool gets for the duration of one call.
pub struct ToolContext<'a> {
    pub document: &'a mut AgentStateDocument,
    pub interrupt: &'a mut InterruptSlot,
    pub call_id: &'a str,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        document: &'a mut AgentStateDocument,
        interrupt: &'a mut InterruptSlot,
        call_id: &'a str,
    ) -> Self {
        Self {
            document,
            interrupt,
            call_id,
        }
    }
}

/// A named action the model can take.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "state_query").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool.
    ///
    /// Recoverable failures should come back as `Ok` with `success: false`
    /// so the model sees them as observations.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool call against the given context.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let mut result = tool.execute(call.arguments.clone(), ctx).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Writes its argument into `data.echo`.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            ctx: &mut ToolContext<'_>,
        ) -> Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            let ops = statecraft_state::parse_patch(
                &json!([{"op": "add", "path": "/echo", "value": text}]),
            )
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
            ctx.document
                .apply_patch(&ops)
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "echo".into(),
                    reason: e.to_string(),
                })?;
            Ok(ToolResult::ok(ctx.call_id, text))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_execute_tool_with_context() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "call_1");
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: json!({"text": "hello world"}),
        };
        let result = registry.execute(&call, &mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.output, "hello world");
        assert_eq!(doc.data(), &json!({"echo": "hello world"}));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "call_1");
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: json!({}),
        };
        let err = registry.execute(&call, &mut ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}

//! Shared fixtures for gateway tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use statecraft_agent::{ReactAgent, TaskRegistry, TaskRunner};
use statecraft_core::error::ProviderError;
use statecraft_core::event::EventBus;
use statecraft_core::message::{Message, MessageToolCall};
use statecraft_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::{Arc, Mutex};

use crate::card::AgentCard;
use crate::{GatewayState, SharedState};

/// Lightweight mock provider: replays its script, then answers with a
/// fixed text.
pub struct MockProvider {
    script: Mutex<Vec<ProviderResponse>>,
}

impl MockProvider {
    pub fn new(script: Vec<ProviderResponse>) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "gateway_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Ok(text("Mock response from agent"));
        }
        Ok(script.remove(0))
    }
}

pub fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent(content),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn tool_call(name: &str, arguments: Value) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent("").with_tool_calls(vec![MessageToolCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: arguments.to_string(),
        }]),
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn patch_then_answer(patch: Value, answer: &str) -> Vec<ProviderResponse> {
    vec![tool_call("state_modify", json!({ "patch": patch })), text(answer)]
}

pub fn ask(question: &str) -> ProviderResponse {
    tool_call("request_input", json!({ "question": question }))
}

pub fn test_state(script: Vec<ProviderResponse>) -> SharedState {
    let bus = Arc::new(EventBus::default());
    let agent = ReactAgent::new(
        Arc::new(MockProvider::new(script)),
        "mock-model",
        0.0,
        Arc::new(statecraft_tools::default_registry()),
        "You are a test agent.",
        bus.clone(),
    );
    let runner = TaskRunner::new(Arc::new(agent), Arc::new(TaskRegistry::new(100)), bus);
    Arc::new(GatewayState {
        runner: Arc::new(runner),
        agent_id: "supervisor".into(),
        card: AgentCard::supervisor("http://localhost:8000/supervisor/"),
    })
}

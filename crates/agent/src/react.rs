//! ReAct loop — plan, act, observe, as an explicit state machine.
//!
//! Each turn starts in `Planning`: the model sees the system prompt, the
//! retained history window and the tool schema. A reply without tool calls
//! ends the turn (`Done`); a reply with tool calls moves to `Acting`, where
//! every call runs in issue order against the task's state document and its
//! observation is appended as a tool message. A call that raises an
//! interrupt parks the task in `AwaitingInput`; the rest of the batch is
//! answered with a skip notice so the history stays well-formed.
//!
//! Suspension is plain data: the pending question lives in the task's
//! [`InterruptSlot`](statecraft_tools::InterruptSlot) and nothing is held
//! across turns.

use crate::error::AgentError;
use crate::events::TurnEvent;
use crate::task::TaskInstance;
use chrono::Utc;
use statecraft_core::event::{DomainEvent, EventBus};
use statecraft_core::message::{Message, MessageToolCall, Role};
use statecraft_core::provider::{Provider, ProviderRequest};
use statecraft_core::tool::{ToolCall, ToolResult};
use statecraft_tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Observation recorded for calls issued after an interrupt in the same batch.
pub const SKIPPED_OBSERVATION: &str = "skipped: awaiting user input";

/// States of the reasoning loop within one turn.
#[derive(Debug)]
pub enum LoopState {
    Planning,
    Acting(Vec<MessageToolCall>),
    AwaitingInput(Message),
    Done(Message),
    Failed(AgentError),
}

/// How a turn that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEnd {
    /// The final agent answer.
    Completed(Message),
    /// The question the user must answer before the task can go on.
    AwaitingInput(Message),
}

pub struct ReactAgent {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: usize,
    /// Number of most recent messages sent to the model; `None` sends all.
    history_window: Option<usize>,
    event_bus: Arc<EventBus>,
}

impl ReactAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: 10,
            history_window: None,
            event_bus,
        }
    }

    /// Set max planning steps per turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Only send the last `window` messages to the model. The document
    /// always keeps the full history.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = Some(window);
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn: record `input` and loop until the task answers, asks
    /// for input, or fails.
    ///
    /// Any outstanding interrupt is cleared first, since `input` is the
    /// answer to it.
    pub async fn run(
        &self,
        instance: &mut TaskInstance,
        input: Message,
        sink: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnEnd, AgentError> {
        instance.interrupt.take();
        instance.interrupt.take_violation();
        instance.document.append_message(input);

        info!(
            task_id = %instance.task_id,
            model = %self.model,
            max_iter = self.max_iterations,
            "ReAct loop starting"
        );

        let mut iterations = 0usize;
        let mut state = LoopState::Planning;
        loop {
            state = match state {
                LoopState::Planning if iterations >= self.max_iterations => {
                    warn!(task_id = %instance.task_id, "max iterations reached ({})", self.max_iterations);
                    LoopState::Failed(AgentError::IterationLimit(self.max_iterations))
                }
                LoopState::Planning => {
                    iterations += 1;
                    self.plan(instance, iterations, sink).await
                }
                LoopState::Acting(calls) => self.act(instance, calls, sink).await,
                LoopState::AwaitingInput(question) => {
                    info!(task_id = %instance.task_id, iterations, "ReAct loop awaiting input");
                    return Ok(TurnEnd::AwaitingInput(question));
                }
                LoopState::Done(answer) => {
                    info!(task_id = %instance.task_id, iterations, "ReAct loop completed");
                    return Ok(TurnEnd::Completed(answer));
                }
                LoopState::Failed(error) => return Err(error),
            };
        }
    }

    async fn plan(
        &self,
        instance: &mut TaskInstance,
        iteration: usize,
        sink: Option<&mpsc::Sender<TurnEvent>>,
    ) -> LoopState {
        debug!(task_id = %instance.task_id, iteration, "ReAct iteration");
        emit(sink, TurnEvent::Planning { iteration }).await;

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: self.planning_messages(instance.document.messages()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
        };

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(task_id = %instance.task_id, error = %e, "generation failed");
                return LoopState::Failed(AgentError::GenerationFailure(e));
            }
        };

        if let Some(usage) = &response.usage {
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                task_id: instance.task_id.clone(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }

        let mut message = response.message;
        message.role = Role::Agent;
        let calls = message.tool_calls.clone();
        instance.document.append_message(message.clone());

        if calls.is_empty() {
            LoopState::Done(message)
        } else {
            LoopState::Acting(calls)
        }
    }

    async fn act(
        &self,
        instance: &mut TaskInstance,
        calls: Vec<MessageToolCall>,
        sink: Option<&mpsc::Sender<TurnEvent>>,
    ) -> LoopState {
        for call in calls {
            if instance.interrupt.is_raised() {
                instance
                    .document
                    .append_message(Message::tool_result(&call.id, SKIPPED_OBSERVATION));
                continue;
            }

            emit(
                sink,
                TurnEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            )
            .await;

            let data_revision = instance.document.revision();
            let start = Instant::now();
            let result = self.execute_call(instance, &call).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            let data_changed = instance.document.revision() != data_revision;

            debug!(
                task_id = %instance.task_id,
                tool = %call.name,
                success = result.success,
                duration_ms,
                "tool executed"
            );
            self.event_bus.publish(DomainEvent::ToolExecuted {
                task_id: instance.task_id.clone(),
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });
            if data_changed {
                self.event_bus.publish(DomainEvent::StateCommitted {
                    task_id: instance.task_id.clone(),
                    revision: instance.document.revision(),
                    timestamp: Utc::now(),
                });
                emit(
                    sink,
                    TurnEvent::StateChanged {
                        revision: instance.document.revision(),
                    },
                )
                .await;
            }
            emit(
                sink,
                TurnEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    success: result.success,
                    output: result.output.clone(),
                },
            )
            .await;

            instance
                .document
                .append_message(Message::tool_result(&call.id, result.output));

            if let Some(violation) = instance.interrupt.take_violation() {
                warn!(task_id = %instance.task_id, tool = %call.name, error = %violation, "interrupt contract violated");
                return LoopState::Failed(AgentError::Interrupt(violation));
            }
        }

        match instance.interrupt.pending() {
            Some(question) => {
                emit(
                    sink,
                    TurnEvent::Interrupted {
                        question: question.content.clone(),
                    },
                )
                .await;
                LoopState::AwaitingInput(question.clone())
            }
            None => LoopState::Planning,
        }
    }

    /// Run one call. Unknown tools and bad arguments come back as failed
    /// observations rather than errors.
    async fn execute_call(&self, instance: &mut TaskInstance, call: &MessageToolCall) -> ToolResult {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(arguments) => arguments,
                Err(e) => {
                    return ToolResult::failure(
                        &call.id,
                        format!("invalid arguments for {}: {e}", call.name),
                    );
                }
            }
        };

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        let mut ctx = ToolContext::new(&mut instance.document, &mut instance.interrupt, &call.id);
        match self.tools.execute(&tool_call, &mut ctx).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(&call.id, e),
        }
    }

    /// System prompt plus the retained history window.
    ///
    /// The window never starts on a tool message, whose agent message (and
    /// tool calls) would otherwise be cut off.
    fn planning_messages(&self, history: &[Message]) -> Vec<Message> {
        let mut start = match self.history_window {
            Some(window) if history.len() > window => history.len() - window,
            _ => 0,
        };
        while history.get(start).is_some_and(|m| m.role == Role::Tool) {
            start += 1;
        }

        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend_from_slice(&history[start..]);
        messages
    }
}

async fn emit(sink: Option<&mpsc::Sender<TurnEvent>>, event: TurnEvent) {
    if let Some(tx) = sink {
        // A caller that stopped listening does not stop the turn
        let _ = tx.send(event).await;
    }
}

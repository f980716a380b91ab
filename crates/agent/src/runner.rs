//! Runs turns against registered tasks and reports status-bearing outcomes.

use crate::error::{AgentError, Result, TaskError};
use crate::events::TurnEvent;
use crate::react::{ReactAgent, TurnEnd};
use crate::registry::TaskRegistry;
use crate::task::TaskHandle;
use crate::turn::{InboundMessage, TurnOutcome, TurnRequest};
use chrono::Utc;
use statecraft_core::event::{DomainEvent, EventBus};
use statecraft_core::message::Message;
use statecraft_core::task::TaskStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Reply to a message that carries no text. The model is not called.
pub const GREETING: &str = "Hello! How can I help you today?";

pub struct TaskRunner {
    agent: Arc<ReactAgent>,
    registry: Arc<TaskRegistry>,
    event_bus: Arc<EventBus>,
    turn_timeout: Option<Duration>,
}

impl TaskRunner {
    pub fn new(agent: Arc<ReactAgent>, registry: Arc<TaskRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            agent,
            registry,
            event_bus,
            turn_timeout: None,
        }
    }

    /// Fail turns that run longer than `timeout`.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    pub fn agent(&self) -> &Arc<ReactAgent> {
        &self.agent
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Resolve and run in one step.
    pub async fn handle(
        &self,
        request: TurnRequest,
        sink: Option<mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnOutcome> {
        let task = self.resolve(&request)?;
        self.run(&task, request.message, sink).await
    }

    /// The task a request belongs to. Lets callers learn the ids before the
    /// turn runs.
    pub fn resolve(&self, request: &TurnRequest) -> Result<Arc<TaskHandle>> {
        let (task, _) = self
            .registry
            .resolve(request.context_id.as_deref(), request.task_id.as_deref())?;
        Ok(task)
    }

    /// Run one turn on `task`.
    ///
    /// Waits for any turn already running on the task. The inbound message
    /// is recorded as user input.
    pub async fn run(
        &self,
        task: &TaskHandle,
        message: InboundMessage,
        sink: Option<mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnOutcome> {
        let mut instance = task.lock().await;

        // A concurrent turn may have finished the task while we waited
        let status = task.status();
        if status.is_terminal() {
            return Err(TaskError::TaskAlreadyTerminal {
                task_id: task.task_id().to_string(),
                status,
            });
        }

        info!(
            context_id = task.context_id(),
            task_id = task.task_id(),
            "turn started"
        );
        self.transition(task, TaskStatus::Working, None);

        let (status, reply) = if message.content.trim().is_empty() {
            (TaskStatus::Completed, Message::agent(GREETING))
        } else {
            let turn = self
                .agent
                .run(&mut instance, Message::user(message.content), sink.as_ref());
            let result = match self.turn_timeout {
                Some(limit) => tokio::time::timeout(limit, turn)
                    .await
                    .unwrap_or(Err(AgentError::Timeout(limit.as_secs()))),
                None => turn.await,
            };
            match result {
                Ok(TurnEnd::Completed(answer)) => (TaskStatus::Completed, answer),
                Ok(TurnEnd::AwaitingInput(question)) => (TaskStatus::InputRequired, question),
                Err(e) => {
                    warn!(task_id = task.task_id(), error = %e, "turn failed");
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("task {}", task.task_id()),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    instance.interrupt.take();
                    (TaskStatus::Failed, Message::agent(format!("Task failed: {e}")))
                }
            }
        };

        self.transition(task, status, Some(reply.clone()));
        if let Some(tx) = &sink {
            let _ = tx.send(TurnEvent::Finished { status }).await;
        }
        info!(task_id = task.task_id(), status = %status, "turn finished");

        Ok(TurnOutcome {
            context_id: task.context_id().to_string(),
            task_id: task.task_id().to_string(),
            status,
            final_message: Some(reply),
            state_artifact: Some(instance.document.snapshot().as_ref().clone()),
        })
    }

    /// The current committed view of a task, without waiting for a running turn.
    pub fn outcome(&self, task_id: &str) -> Result<TurnOutcome> {
        let task = self.registry.get(task_id)?;
        Ok(current_outcome(&task))
    }

    /// Cancel a task that awaits input.
    pub fn cancel(&self, task_id: &str) -> Result<TurnOutcome> {
        let task = self.registry.cancel(task_id)?;
        self.publish_status(&task, TaskStatus::Canceled);
        Ok(current_outcome(&task))
    }

    fn transition(&self, task: &TaskHandle, status: TaskStatus, message: Option<Message>) {
        task.set_status(status, message);
        self.publish_status(task, status);
    }

    fn publish_status(&self, task: &TaskHandle, status: TaskStatus) {
        self.event_bus.publish(DomainEvent::TaskStatusChanged {
            context_id: task.context_id().to_string(),
            task_id: task.task_id().to_string(),
            status,
            timestamp: Utc::now(),
        });
    }
}

fn current_outcome(task: &TaskHandle) -> TurnOutcome {
    let record = task.status_record();
    TurnOutcome {
        context_id: task.context_id().to_string(),
        task_id: task.task_id().to_string(),
        status: record.status,
        final_message: record.message,
        state_artifact: Some(task.snapshot().as_ref().clone()),
    }
}

//! A2A protocol surface: wire types and the JSON-RPC methods
//! `message/send`, `message/stream`, `tasks/get` and `tasks/cancel`.

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use statecraft_agent::{InboundMessage, TaskHandle, TaskRunner, TurnEvent, TurnOutcome, TurnRequest};
use statecraft_core::message::{Message, Role};
use statecraft_core::task::TaskStatus;
use statecraft_state::StateSnapshot;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::SharedState;
use crate::rpc::{
    INTERNAL_ERROR, METHOD_NOT_FOUND, RpcError, RpcRequest, RpcResponse, parse_request,
};

// ── Wire types ────────────────────────────────────────────────────────────

/// One content part of a message or artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
    File { file: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub role: String,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

fn message_kind() -> String {
    "message".into()
}

impl A2aMessage {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The A2A form of a stored message. Tool observations, system text
    /// and content-less tool-call requests have none.
    fn from_message(message: &Message, context_id: &str, task_id: &str) -> Option<Self> {
        let role = match message.role {
            Role::User => "user",
            Role::Agent if !message.content.is_empty() => "agent",
            _ => return None,
        };
        Some(Self {
            kind: message_kind(),
            role: role.into(),
            parts: vec![Part::Text {
                text: message.content.clone(),
            }],
            message_id: message.id.clone(),
            context_id: Some(context_id.into()),
            task_id: Some(task_id.into()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub state: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<A2aMessage>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    pub description: String,
    pub parts: Vec<Part>,
}

impl Artifact {
    /// The task's committed state as a data part: `{messages, data}`.
    pub fn agent_state(snapshot: &StateSnapshot) -> Self {
        Self {
            artifact_id: format!("agent-state-{}", Uuid::new_v4()),
            name: "Agent State".into(),
            description: format!("Agent state at revision {}", snapshot.revision),
            parts: vec![Part::Data {
                data: snapshot.view(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub kind: String,
    pub id: String,
    pub context_id: String,
    pub status: TaskState,
    pub artifacts: Vec<Artifact>,
    pub history: Vec<A2aMessage>,
}

impl Task {
    pub fn from_outcome(outcome: &TurnOutcome) -> Self {
        let (context_id, task_id) = (outcome.context_id.as_str(), outcome.task_id.as_str());
        let history = outcome
            .state_artifact
            .as_ref()
            .map(|snapshot| {
                snapshot
                    .messages
                    .iter()
                    .filter_map(|m| A2aMessage::from_message(m, context_id, task_id))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            kind: "task".into(),
            id: task_id.into(),
            context_id: context_id.into(),
            status: TaskState {
                state: outcome.status,
                message: outcome
                    .final_message
                    .as_ref()
                    .and_then(|m| A2aMessage::from_message(m, context_id, task_id)),
                timestamp: Utc::now().to_rfc3339(),
            },
            artifacts: outcome
                .state_artifact
                .iter()
                .map(Artifact::agent_state)
                .collect(),
            history,
        }
    }

    /// Keep only the most recent `length` history entries.
    fn truncate_history(mut self, length: Option<usize>) -> Self {
        if let Some(length) = length
            && self.history.len() > length
        {
            self.history.drain(..self.history.len() - length);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    pub kind: String,
    pub task_id: String,
    pub context_id: String,
    pub status: TaskState,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    pub kind: String,
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
    pub append: bool,
    pub last_chunk: bool,
}

fn status_update(
    task: &TaskHandle,
    state: TaskStatus,
    message: Option<&Message>,
    is_final: bool,
    metadata: Option<Value>,
) -> TaskStatusUpdateEvent {
    TaskStatusUpdateEvent {
        kind: "status-update".into(),
        task_id: task.task_id().into(),
        context_id: task.context_id().into(),
        status: TaskState {
            state,
            message: message.and_then(|m| A2aMessage::from_message(m, task.context_id(), task.task_id())),
            timestamp: Utc::now().to_rfc3339(),
        },
        is_final,
        metadata,
    }
}

fn artifact_update(task: &TaskHandle, snapshot: &StateSnapshot, last_chunk: bool) -> TaskArtifactUpdateEvent {
    TaskArtifactUpdateEvent {
        kind: "artifact-update".into(),
        task_id: task.task_id().into(),
        context_id: task.context_id().into(),
        artifact: Artifact::agent_state(snapshot),
        append: false,
        last_chunk,
    }
}

// ── Params ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendParams {
    pub message: A2aMessage,
    #[serde(default)]
    pub configuration: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl MessageSendParams {
    /// The turn this message asks for. Only user messages are accepted.
    pub fn into_turn_request(self) -> Result<TurnRequest, RpcError> {
        if self.message.role != "user" {
            return Err(RpcError::invalid_params(format!(
                "message.role must be 'user', got '{}'",
                self.message.role
            )));
        }
        Ok(TurnRequest {
            context_id: self.message.context_id.clone(),
            task_id: self.message.task_id.clone(),
            message: InboundMessage::user(self.message.text()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdParams {
    pub id: String,
    #[serde(default)]
    pub history_length: Option<usize>,
}

fn params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = params.ok_or_else(|| RpcError::invalid_params("params are required"))?;
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /{agent_id}/`: the JSON-RPC endpoint.
pub(crate) async fn rpc_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return Json(response).into_response(),
    };
    debug!(method = %request.method, "Received JSON-RPC request");

    let RpcRequest { method, params, id, .. } = request;
    let runner = &state.runner;
    let result = match method.as_str() {
        "message/send" => message_send(runner, params).await,
        "message/stream" => {
            return match message_stream(runner.clone(), id, params) {
                Ok(sse) => sse.into_response(),
                Err(response) => Json(response).into_response(),
            };
        }
        "tasks/get" => tasks_get(runner, params),
        "tasks/cancel" => tasks_cancel(runner, params),
        other => {
            error!(method = other, "Unknown JSON-RPC method");
            Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method '{other}' not found"),
            ))
        }
    };
    Json(RpcResponse::from_result(id, result)).into_response()
}

/// Resolve the task a message belongs to.
fn prepare_turn(
    runner: &TaskRunner,
    params_value: Option<Value>,
) -> Result<(Arc<TaskHandle>, InboundMessage), RpcError> {
    let request = params::<MessageSendParams>(params_value)?.into_turn_request()?;
    let task = runner.resolve(&request)?;
    Ok((task, request.message))
}

async fn message_send(runner: &TaskRunner, params_value: Option<Value>) -> Result<Value, RpcError> {
    let (task, message) = prepare_turn(runner, params_value)?;
    info!(
        context_id = task.context_id(),
        task_id = task.task_id(),
        "message/send"
    );
    let outcome = runner.run(&task, message, None).await?;
    encode(&Task::from_outcome(&outcome))
}

fn tasks_get(runner: &TaskRunner, params_value: Option<Value>) -> Result<Value, RpcError> {
    let params = params::<TaskIdParams>(params_value)?;
    let outcome = runner.outcome(&params.id)?;
    encode(&Task::from_outcome(&outcome).truncate_history(params.history_length))
}

fn tasks_cancel(runner: &TaskRunner, params_value: Option<Value>) -> Result<Value, RpcError> {
    let params = params::<TaskIdParams>(params_value)?;
    info!(task_id = %params.id, "tasks/cancel");
    let outcome = runner.cancel(&params.id)?;
    encode(&Task::from_outcome(&outcome))
}

/// `message/stream`: run the turn in the background and stream its
/// progress as server-sent JSON-RPC responses.
///
/// Errors found before the turn starts are answered with a plain JSON-RPC
/// response instead of a stream.
fn message_stream(
    runner: Arc<TaskRunner>,
    id: Option<Value>,
    params_value: Option<Value>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, RpcResponse> {
    let (task, message) = match prepare_turn(&runner, params_value) {
        Ok(prepared) => prepared,
        Err(e) => return Err(RpcResponse::error(id, e)),
    };
    info!(
        context_id = task.context_id(),
        task_id = task.task_id(),
        "message/stream"
    );

    let (tx, rx) = mpsc::channel::<RpcResponse>(64);
    tokio::spawn(stream_turn(runner, task, message, id, tx));

    let stream = ReceiverStream::new(rx).map(|response| {
        let data = serde_json::to_string(&response).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().data(data))
    });
    Ok(Sse::new(stream))
}

/// Drive one turn and forward its events. The turn always runs to the end,
/// even if the client goes away.
async fn stream_turn(
    runner: Arc<TaskRunner>,
    task: Arc<TaskHandle>,
    message: InboundMessage,
    id: Option<Value>,
    out: mpsc::Sender<RpcResponse>,
) {
    let respond = |result: Result<Value, RpcError>| RpcResponse::from_result(id.clone(), result);

    let _ = out
        .send(respond(encode(&status_update(&task, TaskStatus::Working, None, false, None))))
        .await;

    let (event_tx, mut event_rx) = mpsc::channel::<TurnEvent>(32);
    let turn = {
        let runner = runner.clone();
        let task = task.clone();
        tokio::spawn(async move { runner.run(&task, message, Some(event_tx)).await })
    };

    while let Some(event) = event_rx.recv().await {
        let update = match &event {
            TurnEvent::Finished { .. } => continue,
            TurnEvent::StateChanged { .. } => encode(&artifact_update(&task, &task.snapshot(), false)),
            _ => encode(&status_update(
                &task,
                TaskStatus::Working,
                None,
                false,
                Some(json!({ "turnEvent": event })),
            )),
        };
        let _ = out.send(respond(update)).await;
    }

    match turn.await {
        Ok(Ok(outcome)) => {
            if let Some(snapshot) = &outcome.state_artifact {
                let _ = out.send(respond(encode(&artifact_update(&task, snapshot, true)))).await;
            }
            let last = status_update(
                &task,
                outcome.status,
                outcome.final_message.as_ref(),
                true,
                None,
            );
            let _ = out.send(respond(encode(&last))).await;
        }
        Ok(Err(e)) => {
            let _ = out.send(respond(Err(e.into()))).await;
        }
        Err(e) => {
            error!(task_id = task.task_id(), error = %e, "Streaming turn aborted");
            let _ = out
                .send(respond(Err(RpcError::new(INTERNAL_ERROR, "turn aborted"))))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_message(parts: Vec<Part>) -> A2aMessage {
        A2aMessage {
            kind: message_kind(),
            role: "user".into(),
            parts,
            message_id: "m1".into(),
            context_id: None,
            task_id: None,
        }
    }

    #[test]
    fn text_parts_are_concatenated() {
        let message = user_message(vec![
            Part::Text { text: "first".into() },
            Part::Data { data: json!({"ignored": true}) },
            Part::Text { text: "second".into() },
        ]);
        assert_eq!(message.text(), "first\nsecond");
    }

    #[test]
    fn parses_wire_message() {
        let params: MessageSendParams = serde_json::from_value(json!({
            "message": {
                "role": "user",
                "parts": [{"kind": "text", "text": "hi"}],
                "messageId": "abc",
                "contextId": "c1",
                "taskId": "t1"
            },
            "configuration": {"blocking": true}
        }))
        .unwrap();
        let request = params.into_turn_request().unwrap();
        assert_eq!(request.context_id.as_deref(), Some("c1"));
        assert_eq!(request.task_id.as_deref(), Some("t1"));
        assert_eq!(request.message.content, "hi");
    }

    #[test]
    fn rejects_non_user_role() {
        let mut message = user_message(vec![Part::Text { text: "hi".into() }]);
        message.role = "agent".into();
        let params = MessageSendParams {
            message,
            configuration: None,
            metadata: None,
        };
        let err = params.into_turn_request().unwrap_err();
        assert_eq!(err.code, crate::rpc::INVALID_PARAMS);
    }

    #[test]
    fn task_from_outcome_carries_state_and_history() {
        let outcome = TurnOutcome {
            context_id: "c1".into(),
            task_id: "t1".into(),
            status: TaskStatus::Completed,
            final_message: Some(Message::agent("Done")),
            state_artifact: Some(StateSnapshot {
                revision: 4,
                messages: vec![
                    Message::user("count"),
                    Message::agent(""),
                    Message::tool_result("call_1", "ok"),
                    Message::agent("Done"),
                ],
                data: json!({"count": 1}),
            }),
        };

        let task = serde_json::to_value(Task::from_outcome(&outcome)).unwrap();

        assert_eq!(task["kind"], "task");
        assert_eq!(task["id"], "t1");
        assert_eq!(task["contextId"], "c1");
        assert_eq!(task["status"]["state"], "completed");
        assert_eq!(task["status"]["message"]["parts"][0]["text"], "Done");
        let artifact = &task["artifacts"][0];
        assert!(artifact["artifactId"].as_str().unwrap().starts_with("agent-state-"));
        assert_eq!(artifact["name"], "Agent State");
        assert_eq!(artifact["parts"][0]["kind"], "data");
        assert_eq!(artifact["parts"][0]["data"]["data"]["count"], 1);
        assert_eq!(artifact["parts"][0]["data"]["messages"].as_array().unwrap().len(), 4);
        // Tool observations and empty tool-call turns stay out of the history
        let history = task["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[1]["role"], "agent");
    }

    #[test]
    fn history_length_keeps_the_tail() {
        let outcome = TurnOutcome {
            context_id: "c1".into(),
            task_id: "t1".into(),
            status: TaskStatus::InputRequired,
            final_message: None,
            state_artifact: Some(StateSnapshot {
                revision: 3,
                messages: vec![Message::user("a"), Message::agent("b"), Message::user("c")],
                data: json!({}),
            }),
        };
        let task = Task::from_outcome(&outcome).truncate_history(Some(2));
        assert_eq!(task.history.len(), 2);
        assert_eq!(task.history[0].parts, vec![Part::Text { text: "b".into() }]);
    }
}

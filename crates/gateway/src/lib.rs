//! HTTP gateway for Statecraft.
//!
//! Serves the agent over the A2A protocol (JSON-RPC 2.0 with SSE
//! streaming) under `/{agent_id}/`, plus a health check and a small
//! read-only v1 API for tools and task state.
//!
//! Built on Axum.

pub mod a2a;
pub mod api_v1;
pub mod card;
pub mod rpc;

#[cfg(test)]
pub(crate) mod test_support;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{Method, header},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use statecraft_agent::{ReactAgent, TaskRegistry, TaskRunner};
use statecraft_config::AppConfig;
use statecraft_core::event::{DomainEvent, EventBus};
use statecraft_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use card::AgentCard;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub runner: Arc<TaskRunner>,
    /// Path segment the agent is mounted under
    pub agent_id: String,
    pub card: AgentCard,
}

pub type SharedState = Arc<GatewayState>;

/// Assemble the task runner described by `config` around `provider`.
pub fn build_runner(config: &AppConfig, provider: Arc<dyn Provider>) -> TaskRunner {
    let tools = Arc::new(statecraft_tools::default_registry());
    let event_bus = Arc::new(EventBus::default());

    let mut agent = ReactAgent::new(
        provider,
        &config.llm.model,
        config.llm.temperature,
        tools,
        &config.agent.system_prompt,
        event_bus.clone(),
    )
    .with_max_iterations(config.agent.max_iterations);
    if let Some(max_tokens) = config.llm.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }
    if let Some(window) = config.agent.history_window {
        agent = agent.with_history_window(window);
    }

    let registry = Arc::new(TaskRegistry::new(config.agent.max_tasks));
    TaskRunner::new(Arc::new(agent), registry, event_bus)
        .with_turn_timeout(Duration::from_secs(config.agent.turn_timeout_secs))
}

/// Log every domain event published on `bus` until the bus is dropped.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ResponseGenerated { task_id, model, tokens_used, .. } => {
            debug!(task_id = %task_id, model = %model, tokens_used, "Model responded")
        }
        DomainEvent::ToolExecuted { task_id, tool_name, success, duration_ms, .. } => {
            debug!(task_id = %task_id, tool = %tool_name, success, duration_ms, "Tool executed")
        }
        DomainEvent::StateCommitted { task_id, revision, .. } => {
            debug!(task_id = %task_id, revision, "State committed")
        }
        DomainEvent::TaskStatusChanged { context_id, task_id, status, .. } => info!(
            context_id = %context_id,
            task_id = %task_id,
            status = %status,
            "Task status changed"
        ),
        DomainEvent::ErrorOccurred { context, error_message, .. } => {
            warn!(context = %context, error = %error_message, "Task error")
        }
    }
}

/// Build the router with all gateway routes.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - CORS for browser-based A2A clients
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let agent_root = format!("/{}", state.agent_id);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            &format!("{agent_root}/.well-known/agent-card.json"),
            get(agent_card_handler),
        )
        .route(&format!("{agent_root}/"), post(a2a::rpc_handler))
        .route(&agent_root, post(a2a::rpc_handler))
        .nest("/v1", api_v1::v1_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = statecraft_providers::build_from_config(&config)?;
    let runner = build_runner(&config, provider);
    spawn_event_logger(runner.event_bus());
    let card = AgentCard::supervisor(card::endpoint_url(
        &config.gateway.host,
        config.gateway.port,
        &config.agent.id,
    ));

    let state = Arc::new(GatewayState {
        runner: Arc::new(runner),
        agent_id: config.agent.id.clone(),
        card,
    });
    let app = build_router(state);

    info!(
        addr = %addr,
        agent = %config.agent.id,
        model = %config.llm.model,
        environment = %config.environment,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn agent_card_handler(State(state): State<SharedState>) -> Json<AgentCard> {
    Json(state.card.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use statecraft_core::task::TaskStatus;
    use crate::test_support::{ask, patch_then_answer, test_state, text};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn rpc(app: &Router, body: Value) -> Value {
        let req = Request::builder()
            .method("POST")
            .uri("/supervisor/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    fn send(text: &str, context_id: Option<&str>, task_id: Option<&str>) -> Value {
        let mut message = json!({
            "role": "user",
            "parts": [{"kind": "text", "text": text}],
            "messageId": uuid::Uuid::new_v4().to_string(),
        });
        if let Some(ctx) = context_id {
            message["contextId"] = json!(ctx);
        }
        if let Some(task) = task_id {
            message["taskId"] = json!(task);
        }
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": {"message": message, "configuration": {"blocking": true}},
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(vec![]));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn serves_agent_card() {
        let app = build_router(test_state(vec![]));
        let req = Request::builder()
            .uri("/supervisor/.well-known/agent-card.json")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let card = body_json(response).await;
        assert_eq!(card["name"], "Supervisor");
        assert_eq!(card["capabilities"]["streaming"], true);
    }

    #[tokio::test]
    async fn message_send_returns_task_with_state_artifact() {
        let app = build_router(test_state(patch_then_answer(
            json!([{"op": "add", "path": "/count", "value": 1}]),
            "Counted",
        )));

        let response = rpc(&app, send("count please", None, None)).await;

        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        let task = &response["result"];
        assert_eq!(task["kind"], "task");
        assert_eq!(task["status"]["state"], "completed");
        assert_eq!(task["status"]["message"]["parts"][0]["text"], "Counted");
        assert_eq!(task["artifacts"][0]["parts"][0]["data"]["data"]["count"], 1);
    }

    #[tokio::test]
    async fn empty_message_gets_greeting() {
        let app = build_router(test_state(vec![]));
        let response = rpc(&app, send("", None, None)).await;

        let task = &response["result"];
        assert_eq!(task["status"]["state"], "completed");
        assert_eq!(
            task["status"]["message"]["parts"][0]["text"],
            statecraft_agent::GREETING
        );
    }

    #[tokio::test]
    async fn input_required_then_resume_then_reuse_rejected() {
        let app = build_router(test_state(vec![ask("Which city?"), text("Paris it is")]));

        let first = rpc(&app, send("book a trip", None, None)).await;
        let task = &first["result"];
        assert_eq!(task["status"]["state"], "input-required");
        assert_eq!(task["status"]["message"]["parts"][0]["text"], "Which city?");
        let context_id = task["contextId"].as_str().unwrap().to_string();
        let task_id = task["id"].as_str().unwrap().to_string();

        let second = rpc(&app, send("Paris", Some(&context_id), Some(&task_id))).await;
        assert_eq!(second["result"]["id"], task_id.as_str());
        assert_eq!(second["result"]["status"]["state"], "completed");

        let third = rpc(&app, send("again", Some(&context_id), Some(&task_id))).await;
        assert_eq!(third["error"]["code"], rpc::UNSUPPORTED_OPERATION);
    }

    #[tokio::test]
    async fn context_mismatch_is_rejected() {
        let app = build_router(test_state(vec![ask("Which city?")]));
        let first = rpc(&app, send("book a trip", None, None)).await;
        let task_id = first["result"]["id"].as_str().unwrap().to_string();

        let response = rpc(&app, send("Paris", Some("other-context"), Some(&task_id))).await;
        assert_eq!(response["error"]["code"], rpc::UNSUPPORTED_OPERATION);
    }

    #[tokio::test]
    async fn tasks_get_and_cancel() {
        let app = build_router(test_state(vec![ask("Which city?")]));
        let first = rpc(&app, send("book a trip", None, None)).await;
        let task_id = first["result"]["id"].as_str().unwrap().to_string();

        let got = rpc(
            &app,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": {"id": task_id}}),
        )
        .await;
        assert_eq!(got["result"]["status"]["state"], "input-required");

        let canceled = rpc(
            &app,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/cancel", "params": {"id": task_id}}),
        )
        .await;
        assert_eq!(canceled["result"]["status"]["state"], "canceled");

        let again = rpc(
            &app,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tasks/cancel", "params": {"id": task_id}}),
        )
        .await;
        assert_eq!(again["error"]["code"], rpc::TASK_NOT_CANCELABLE);
    }

    #[tokio::test]
    async fn protocol_errors() {
        let app = build_router(test_state(vec![]));

        let missing = rpc(
            &app,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tasks/get", "params": {"id": "nope"}}),
        )
        .await;
        assert_eq!(missing["error"]["code"], rpc::TASK_NOT_FOUND);

        let unknown = rpc(&app, json!({"jsonrpc": "2.0", "id": 1, "method": "tasks/resubscribe"})).await;
        assert_eq!(unknown["error"]["code"], rpc::METHOD_NOT_FOUND);

        let bad_params = rpc(
            &app,
            json!({"jsonrpc": "2.0", "id": 1, "method": "message/send", "params": {"message": 5}}),
        )
        .await;
        assert_eq!(bad_params["error"]["code"], rpc::INVALID_PARAMS);

        let req = Request::builder()
            .method("POST")
            .uri("/supervisor/")
            .header("content-type", "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_json(response).await["error"]["code"], rpc::PARSE_ERROR);
    }

    #[tokio::test]
    async fn message_stream_ends_with_final_status() {
        let app = build_router(test_state(patch_then_answer(
            json!([{"op": "add", "path": "/count", "value": 1}]),
            "Counted",
        )));
        let mut request = send("count please", None, None);
        request["method"] = json!("message/stream");

        let req = Request::builder()
            .method("POST")
            .uri("/supervisor/")
            .header("content-type", "application/json")
            .body(Body::from(request.to_string()))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let events: Vec<Value> = String::from_utf8(body.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();

        assert!(events.len() >= 3);
        assert!(events.iter().all(|e| e["jsonrpc"] == "2.0" && e["id"] == 1));
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| e["result"]["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds[0], "status-update");
        assert!(kinds.contains(&"artifact-update"));

        let last = &events.last().unwrap()["result"];
        assert_eq!(last["kind"], "status-update");
        assert_eq!(last["final"], true);
        assert_eq!(last["status"]["state"], "completed");
        assert_eq!(last["status"]["message"]["parts"][0]["text"], "Counted");
        let finals = events.iter().filter(|e| e["result"]["final"] == true).count();
        assert_eq!(finals, 1);
    }

    #[tokio::test]
    async fn event_logger_drains_until_bus_is_dropped() {
        let bus = EventBus::new(4);
        let logger = spawn_event_logger(&bus);
        for revision in 1..=10 {
            bus.publish(DomainEvent::StateCommitted {
                task_id: "t1".into(),
                revision,
                timestamp: Utc::now(),
            });
        }
        bus.publish(DomainEvent::TaskStatusChanged {
            context_id: "c1".into(),
            task_id: "t1".into(),
            status: TaskStatus::Completed,
            timestamp: Utc::now(),
        });
        drop(bus);
        tokio::time::timeout(Duration::from_secs(5), logger)
            .await
            .expect("logger stops once the bus is gone")
            .unwrap();
    }
}

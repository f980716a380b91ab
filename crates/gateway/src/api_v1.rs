//! HTTP API v1: read-only helper endpoints next to the A2A surface.
//!
//! - `GET /v1/tools`                   — Tool definitions offered to the model
//! - `GET /v1/tasks/{id}/state?path=`  — Committed task state, optionally queried

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statecraft_agent::TaskError;
use statecraft_state::OwnedMatch;

use crate::SharedState;

pub fn v1_router() -> Router<SharedState> {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tasks/{id}/state", get(task_state_handler))
}

#[derive(Serialize, Deserialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Deserialize)]
struct StateQueryParams {
    path: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskStateResponse {
    task_id: String,
    revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<Vec<OwnedMatch>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.runner.agent().tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

async fn task_state_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<StateQueryParams>,
) -> Result<Json<TaskStateResponse>, ApiError> {
    let task = state.runner.registry().get(&id).map_err(|e| match e {
        TaskError::TaskNotFound(_) => api_error(StatusCode::NOT_FOUND, e),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other),
    })?;
    let snapshot = task.snapshot();

    let response = match params.path {
        Some(path) => {
            let matches = snapshot
                .query(&path)
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
            TaskStateResponse {
                task_id: id,
                revision: snapshot.revision,
                state: None,
                path: Some(path),
                matches: Some(matches),
            }
        }
        None => TaskStateResponse {
            task_id: id,
            revision: snapshot.revision,
            state: Some(snapshot.view()),
            path: None,
            matches: None,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{patch_then_answer, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use statecraft_agent::TurnRequest;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn list_tools() {
        let app = v1_router().with_state(test_state(vec![]));
        let (status, json) = get_json(app, "/tools").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 5);
        let names: Vec<&str> = json["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"state_query"));
        assert!(names.contains(&"state_modify"));
        assert!(names.contains(&"request_input"));
    }

    #[tokio::test]
    async fn task_state_query() {
        let state = test_state(patch_then_answer(
            json!([{"op": "add", "path": "/count", "value": 1}]),
            "Done",
        ));
        let outcome = state
            .runner
            .handle(TurnRequest::new("count"), None)
            .await
            .unwrap();

        let app = v1_router().with_state(state.clone());
        let uri = format!("/tasks/{}/state", outcome.task_id);
        let (status, json) = get_json(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"]["data"]["count"], 1);

        let (status, json) = get_json(app.clone(), &format!("{uri}?path=$.data.count")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["matches"][0]["value"], 1);
        assert_eq!(json["matches"][0]["pointer"], "/data/count");

        let (status, json) = get_json(app, &format!("{uri}?path=%24.data%5B")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid path expression"));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let app = v1_router().with_state(test_state(vec![]));
        let (status, _) = get_json(app, "/tasks/nope/state").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

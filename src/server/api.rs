use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use taskboard_common::{ListId, PositionUpdate, TaskId, WorkspaceId};
use tracing::{debug, info};

use super::state::{SharedState, StoreError};

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub title: String,
    #[serde(alias = "workspace_id")]
    pub workspace_id: WorkspaceId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(alias = "list_id")]
    pub list_id: ListId,
    #[serde(alias = "workspace_id")]
    pub workspace_id: WorkspaceId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    #[serde(alias = "workspace_id")]
    pub workspace_id: WorkspaceId,
    pub tasks: Vec<PositionUpdate>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Unauthorized,
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Missing or invalid bearer token".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/taskboard/list", post(create_list))
        .route("/api/taskboard/list/{list_id}", delete(delete_list))
        .route("/api/taskboard/task", post(create_task))
        .route("/api/taskboard/task/{task_id}", delete(delete_task))
        .route("/api/taskboard/tasks/reorder", put(reorder_tasks))
        .route("/api/taskboard/{workspace_id}", get(get_board))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authorize(state: &SharedState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.authorize(bearer_token(headers)) {
        Ok(())
    } else {
        debug!("rejecting request without a valid bearer token");
        Err(ApiError::Unauthorized)
    }
}

fn required_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    Ok(title)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_board(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(workspace_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.board(&WorkspaceId::new(workspace_id))))
}

async fn create_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let title = required_title(&req.title)?;
    let list = state.create_list(&req.workspace_id, title);
    info!(workspace = %req.workspace_id, list_id = %list.id, "list created");
    Ok((StatusCode::CREATED, Json(list)))
}

async fn create_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let title = required_title(&req.title)?;
    let task = state.create_task(&req.workspace_id, &req.list_id, title)?;
    info!(workspace = %req.workspace_id, list_id = %task.list_id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn reorder_tasks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let committed = state.reorder(&req.workspace_id, &req.tasks)?;
    info!(workspace = %req.workspace_id, updates = req.tasks.len(), committed = committed.len(), "tasks reordered");
    Ok(StatusCode::OK)
}

async fn delete_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let task_id = TaskId::new(task_id);
    let (workspace, task) = state.delete_task(&task_id)?;
    info!(workspace = %workspace, task_id = %task_id, list_id = %task.list_id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let list_id = ListId::new(list_id);
    let (workspace, removed) = state.delete_list(&list_id)?;
    info!(workspace = %workspace, list_id = %list_id, tasks = removed.tasks.len(), "list deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::channel::RoomHub;
    use crate::board::events::BoardEvent;
    use crate::server::state::AppState;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        Arc::new(AppState::new(RoomHub::default(), vec!["secret".to_string()]))
    }

    fn test_app(state: SharedState) -> Router {
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer secret");
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn create_list(app: &Router, workspace: &str, title: &str) -> serde_json::Value {
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/taskboard/list",
                Some(serde_json::json!({"title": title, "workspaceId": workspace})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await
    }

    async fn create_task(app: &Router, workspace: &str, list_id: &str, title: &str) -> serde_json::Value {
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/taskboard/task",
                Some(serde_json::json!({"title": title, "listId": list_id, "workspaceId": workspace})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check_needs_no_token() {
        let app = test_app(test_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = test_app(test_state());
        let req = Request::builder()
            .uri("/api/taskboard/w1")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let app = test_app(test_state());
        let req = Request::builder()
            .uri("/api/taskboard/w1")
            .header("authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("bearer"));
    }

    #[tokio::test]
    async fn test_unknown_workspace_returns_empty_board() {
        let app = test_app(test_state());
        let resp = app.oneshot(request("GET", "/api/taskboard/w404", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body, serde_json::json!({"lists": []}));
    }

    #[tokio::test]
    async fn test_create_list_and_task_then_fetch() {
        let app = test_app(test_state());
        let list = create_list(&app, "w1", "  Todo  ").await;
        assert_eq!(list["title"], "Todo");
        assert_eq!(list["workspace_id"], "w1");
        let list_id = list["id"].as_str().unwrap();

        let a = create_task(&app, "w1", list_id, "A").await;
        let b = create_task(&app, "w1", list_id, "B").await;
        assert_eq!(a["position"], 0);
        assert_eq!(b["position"], 1);

        let resp = app.oneshot(request("GET", "/api/taskboard/w1", None)).await.unwrap();
        let board: serde_json::Value = body_json(resp.into_body()).await;
        let tasks = board["lists"][0]["tasks"].as_array().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1]["title"], "B");
    }

    #[tokio::test]
    async fn test_blank_title_is_bad_request() {
        let app = test_app(test_state());
        let resp = app
            .oneshot(request(
                "POST",
                "/api/taskboard/list",
                Some(serde_json::json!({"title": "   ", "workspaceId": "w1"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_task_for_unknown_list_is_not_found() {
        let app = test_app(test_state());
        let resp = app
            .oneshot(request(
                "POST",
                "/api/taskboard/task",
                Some(serde_json::json!({"title": "A", "listId": "ghost", "workspaceId": "w1"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reorder_and_broadcast_committed_order() {
        let state = test_state();
        let app = test_app(state.clone());
        let list = create_list(&app, "w1", "Todo").await;
        let list_id = list["id"].as_str().unwrap().to_string();
        let a = create_task(&app, "w1", &list_id, "A").await;
        let b = create_task(&app, "w1", &list_id, "B").await;
        let (a_id, b_id) = (a["id"].as_str().unwrap(), b["id"].as_str().unwrap());

        let mut rx = state.hub.subscribe(&WorkspaceId::new("w1"));
        let resp = app
            .clone()
            .oneshot(request(
                "PUT",
                "/api/taskboard/tasks/reorder",
                Some(serde_json::json!({
                    "workspaceId": "w1",
                    "tasks": [
                        {"id": b_id, "list_id": list_id, "position": 0},
                        {"id": a_id, "list_id": list_id, "position": 1}
                    ]
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            BoardEvent::from_message(&msg).unwrap(),
            BoardEvent::TasksReordered(vec![
                PositionUpdate::new(b_id, list_id.as_str(), 0),
                PositionUpdate::new(a_id, list_id.as_str(), 1),
            ])
        );
    }

    #[tokio::test]
    async fn test_reorder_with_stale_task_is_not_found() {
        let app = test_app(test_state());
        let list = create_list(&app, "w1", "Todo").await;
        let resp = app
            .oneshot(request(
                "PUT",
                "/api/taskboard/tasks/reorder",
                Some(serde_json::json!({
                    "workspaceId": "w1",
                    "tasks": [{"id": "gone", "list_id": list["id"], "position": 0}]
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_task_broadcasts_and_second_delete_is_not_found() {
        let state = test_state();
        let app = test_app(state.clone());
        let list = create_list(&app, "w1", "Todo").await;
        let task = create_task(&app, "w1", list["id"].as_str().unwrap(), "A").await;
        let uri = format!("/api/taskboard/task/{}", task["id"].as_str().unwrap());

        let mut rx = state.hub.subscribe(&WorkspaceId::new("w1"));
        let resp = app.clone().oneshot(request("DELETE", &uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event, "task:task_deleted");
        assert_eq!(msg.payload["taskId"], task["id"]);
        assert_eq!(msg.payload["listId"], list["id"]);

        let resp = app.oneshot(request("DELETE", &uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_list_cascades_tasks() {
        let app = test_app(test_state());
        let list = create_list(&app, "w1", "Todo").await;
        let list_id = list["id"].as_str().unwrap();
        let task = create_task(&app, "w1", list_id, "A").await;

        let resp = app
            .clone()
            .oneshot(request("DELETE", &format!("/api/taskboard/list/{}", list_id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let uri = format!("/api/taskboard/task/{}", task["id"].as_str().unwrap());
        let resp = app.oneshot(request("DELETE", &uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

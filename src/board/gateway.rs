//! Mutation gateway: REST calls against the persistent store.
//!
//! [`BoardApi`] is the seam sessions depend on; [`HttpGateway`] is the reqwest
//! implementation. Every call attaches `Authorization: Bearer <token>` from a
//! [`CredentialProvider`]. Only the idempotent calls (board fetch and reorder)
//! are retried, and only on `NetworkFailure`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskboard_common::{BoardList, List, ListId, PositionUpdate, Task, TaskId, WorkspaceId};
use tracing::{debug, warn};

use crate::config::TaskboardConfig;
use crate::errors::GatewayError;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Supplies the bearer credential for the acting identity.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, GatewayError>;
}

/// A fixed credential, e.g. from config or the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn from_option(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        self.0
            .clone()
            .ok_or_else(|| GatewayError::Unauthorized("no bearer token configured".to_string()))
    }
}

#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Every list of the workspace with its tasks.
    async fn fetch_board(&self, workspace: &WorkspaceId) -> Result<Vec<BoardList>, GatewayError>;

    async fn create_list(&self, workspace: &WorkspaceId, title: &str) -> Result<List, GatewayError>;

    async fn create_task(
        &self,
        workspace: &WorkspaceId,
        list_id: &ListId,
        title: &str,
    ) -> Result<Task, GatewayError>;

    async fn delete_list(&self, list_id: &ListId) -> Result<(), GatewayError>;

    async fn delete_task(&self, task_id: &TaskId) -> Result<(), GatewayError>;

    /// Persist a full reorder batch in one call.
    async fn reorder_tasks(
        &self,
        workspace: &WorkspaceId,
        updates: &[PositionUpdate],
    ) -> Result<(), GatewayError>;
}

/// Trim a user-supplied title; blank titles never reach the network.
pub fn normalize_title(title: &str) -> Result<String, GatewayError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidInput("title must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Exponential backoff for idempotent calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(operation, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Wire payloads ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BoardPayload {
    #[serde(default)]
    lists: Option<Vec<ListPayload>>,
}

#[derive(Debug, Deserialize)]
struct ListPayload {
    id: ListId,
    #[serde(default, alias = "workspaceId")]
    workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    tasks: Option<Vec<TaskPayload>>,
}

#[derive(Debug, Deserialize)]
struct TaskPayload {
    id: TaskId,
    #[serde(default, alias = "listId")]
    list_id: Option<ListId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    created_at: Option<String>,
}

impl ListPayload {
    fn into_list(self, workspace: &WorkspaceId) -> (List, Option<Vec<TaskPayload>>) {
        let list = List {
            id: self.id,
            workspace_id: self.workspace_id.unwrap_or_else(|| workspace.clone()),
            title: self.title,
            position: self.position,
            created_at: self.created_at,
        };
        (list, self.tasks)
    }
}

impl TaskPayload {
    fn into_task(self, list_id: &ListId, index: usize) -> Task {
        Task {
            id: self.id,
            list_id: self.list_id.unwrap_or_else(|| list_id.clone()),
            title: self.title,
            position: self.position.unwrap_or(index as u32),
            created_at: self.created_at,
        }
    }
}

fn normalize_board(payload: BoardPayload, workspace: &WorkspaceId) -> Vec<BoardList> {
    payload
        .lists
        .unwrap_or_default()
        .into_iter()
        .map(|raw| {
            let (list, tasks) = raw.into_list(workspace);
            let tasks = tasks
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(i, t)| {
                    let mut task = t.into_task(&list.id, i);
                    // Membership comes from nesting, whatever the row says.
                    task.list_id = list.id.clone();
                    task
                })
                .collect();
            BoardList { list, tasks }
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateListBody<'a> {
    title: &'a str,
    workspace_id: &'a WorkspaceId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskBody<'a> {
    title: &'a str,
    list_id: &'a ListId,
    workspace_id: &'a WorkspaceId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReorderBody<'a> {
    workspace_id: &'a WorkspaceId,
    tasks: &'a [PositionUpdate],
}

// ── HTTP implementation ──────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, credentials)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a gateway from the backend, auth and sync sections.
    pub fn from_config(config: &TaskboardConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.backend.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidInput(format!("failed to build HTTP client: {}", e)))?;
        let credentials = Arc::new(StaticToken::from_option(config.auth.token.clone()));
        Ok(Self::with_client(client, config.backend_url(), credentials).with_retry(RetryPolicy {
            attempts: config.sync.reorder_attempts,
            base_delay: Duration::from_millis(config.sync.retry_base_delay_ms),
        }))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/taskboard{}", self.base_url, path)
    }

    /// Send an authorized request and map non-success statuses.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let token = self.credentials.bearer_token().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, url))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = GatewayError::from_status(status.as_u16(), url, &body);
        warn!(url, status = status.as_u16(), error = %err, "taskboard request failed");
        Err(err)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
        url: &str,
    ) -> Result<T, GatewayError> {
        let body = resp.text().await.map_err(|e| GatewayError::from_reqwest(e, url))?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BoardApi for HttpGateway {
    async fn fetch_board(&self, workspace: &WorkspaceId) -> Result<Vec<BoardList>, GatewayError> {
        let url = self.url(&format!("/{}", workspace));
        let payload: BoardPayload = self
            .retry
            .run("fetch_board", || async {
                let resp = self.send(self.client.get(&url), &url).await?;
                Self::read_json(resp, &url).await
            })
            .await?;
        let lists = normalize_board(payload, workspace);
        debug!(workspace = %workspace, lists = lists.len(), "fetched board");
        Ok(lists)
    }

    async fn create_list(&self, workspace: &WorkspaceId, title: &str) -> Result<List, GatewayError> {
        let title = normalize_title(title)?;
        let url = self.url("/list");
        let body = CreateListBody {
            title: &title,
            workspace_id: workspace,
        };
        let resp = self.send(self.client.post(&url).json(&body), &url).await?;
        let raw: ListPayload = Self::read_json(resp, &url).await?;
        let (list, _) = raw.into_list(workspace);
        debug!(workspace = %workspace, list_id = %list.id, "created list");
        Ok(list)
    }

    async fn create_task(
        &self,
        workspace: &WorkspaceId,
        list_id: &ListId,
        title: &str,
    ) -> Result<Task, GatewayError> {
        let title = normalize_title(title)?;
        let url = self.url("/task");
        let body = CreateTaskBody {
            title: &title,
            list_id,
            workspace_id: workspace,
        };
        let resp = self.send(self.client.post(&url).json(&body), &url).await?;
        let raw: TaskPayload = Self::read_json(resp, &url).await?;
        let task = raw.into_task(list_id, 0);
        debug!(workspace = %workspace, list_id = %task.list_id, task_id = %task.id, "created task");
        Ok(task)
    }

    async fn delete_list(&self, list_id: &ListId) -> Result<(), GatewayError> {
        let url = self.url(&format!("/list/{}", list_id));
        self.send(self.client.delete(&url), &url).await?;
        debug!(list_id = %list_id, "deleted list");
        Ok(())
    }

    async fn delete_task(&self, task_id: &TaskId) -> Result<(), GatewayError> {
        let url = self.url(&format!("/task/{}", task_id));
        self.send(self.client.delete(&url), &url).await?;
        debug!(task_id = %task_id, "deleted task");
        Ok(())
    }

    async fn reorder_tasks(
        &self,
        workspace: &WorkspaceId,
        updates: &[PositionUpdate],
    ) -> Result<(), GatewayError> {
        let url = self.url("/tasks/reorder");
        let body = ReorderBody {
            workspace_id: workspace,
            tasks: updates,
        };
        self.retry
            .run("reorder_tasks", || async {
                self.send(self.client.put(&url).json(&body), &url).await.map(|_| ())
            })
            .await?;
        debug!(workspace = %workspace, updates = updates.len(), "persisted reorder");
        Ok(())
    }
}

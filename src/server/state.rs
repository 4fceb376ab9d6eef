//! In-memory persistence for the reference backend.
//!
//! Each workspace's board is a [`BoardStore`], so the server enforces the same
//! ordering rules as clients. Every committed mutation is published to the
//! workspace room on the shared [`RoomHub`] before the boards lock is
//! released, so room order is commit order.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskboard_common::{BoardList, BoardSnapshot, List, ListId, PositionUpdate, Task, TaskId, WorkspaceId};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::board::channel::RoomHub;
use crate::board::events::BoardEvent;
use crate::board::store::BoardStore;

pub type SharedState = Arc<AppState>;

/// Reasons a write cannot be committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Workspace {0} not found")]
    UnknownWorkspace(WorkspaceId),

    #[error("List {0} not found")]
    UnknownList(ListId),

    #[error("Task {0} not found")]
    UnknownTask(TaskId),
}

pub struct AppState {
    boards: Mutex<HashMap<WorkspaceId, BoardStore>>,
    pub hub: RoomHub,
    accepted_tokens: Vec<String>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl AppState {
    /// An empty `accepted_tokens` accepts any non-blank bearer token.
    pub fn new(hub: RoomHub, accepted_tokens: Vec<String>) -> Self {
        Self {
            boards: Mutex::new(HashMap::new()),
            hub,
            accepted_tokens,
        }
    }

    fn boards(&self) -> MutexGuard<'_, HashMap<WorkspaceId, BoardStore>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn authorize(&self, token: Option<&str>) -> bool {
        match token.map(str::trim) {
            Some(t) if !t.is_empty() => {
                self.accepted_tokens.is_empty() || self.accepted_tokens.iter().any(|a| a == t)
            }
            _ => false,
        }
    }

    /// Callers must hold the boards lock.
    fn publish(&self, workspace: &WorkspaceId, event: BoardEvent) {
        let delivered = self.hub.broadcast(workspace, event.to_message());
        debug!(workspace = %workspace, event = event.name(), delivered, "broadcast committed mutation");
    }

    /// The workspace's board; unknown workspaces have an empty one.
    pub fn board(&self, workspace: &WorkspaceId) -> BoardSnapshot {
        self.boards()
            .get(workspace)
            .map(BoardStore::snapshot)
            .unwrap_or_default()
    }

    pub fn create_list(&self, workspace: &WorkspaceId, title: &str) -> List {
        let mut boards = self.boards();
        let store = boards
            .entry(workspace.clone())
            .or_insert_with(|| BoardStore::new(workspace.clone()));
        let list = List {
            id: ListId::new(new_id()),
            workspace_id: workspace.clone(),
            title: title.to_string(),
            position: Some(store.lists().len() as u32),
            created_at: Some(now()),
        };
        store.add_list(list.clone());
        self.publish(workspace, BoardEvent::ListCreated(list.clone()));
        list
    }

    /// Append a task at the end of `list_id`, which must belong to `workspace`.
    pub fn create_task(
        &self,
        workspace: &WorkspaceId,
        list_id: &ListId,
        title: &str,
    ) -> Result<Task, StoreError> {
        let mut boards = self.boards();
        let store = boards
            .get_mut(workspace)
            .ok_or_else(|| StoreError::UnknownList(list_id.clone()))?;
        let position = store
            .list(list_id)
            .map(|l| l.tasks.len() as u32)
            .ok_or_else(|| StoreError::UnknownList(list_id.clone()))?;
        let task = Task {
            id: TaskId::new(new_id()),
            list_id: list_id.clone(),
            title: title.to_string(),
            position,
            created_at: Some(now()),
        };
        store.add_task(task.clone());
        self.publish(workspace, BoardEvent::TaskCreated(task.clone()));
        Ok(task)
    }

    /// Delete a task wherever it lives. Returns its workspace.
    pub fn delete_task(&self, task_id: &TaskId) -> Result<(WorkspaceId, Task), StoreError> {
        let mut boards = self.boards();
        let (workspace, task) = boards
            .iter_mut()
            .find_map(|(ws, store)| store.remove_task_anywhere(task_id).map(|t| (ws.clone(), t)))
            .ok_or_else(|| StoreError::UnknownTask(task_id.clone()))?;
        self.publish(
            &workspace,
            BoardEvent::TaskDeleted {
                task_id: task.id.clone(),
                list_id: task.list_id.clone(),
            },
        );
        Ok((workspace, task))
    }

    /// Delete a list and all of its tasks. Returns its workspace.
    pub fn delete_list(&self, list_id: &ListId) -> Result<(WorkspaceId, BoardList), StoreError> {
        let mut boards = self.boards();
        let (workspace, removed) = boards
            .iter_mut()
            .find_map(|(ws, store)| store.remove_list(list_id).map(|l| (ws.clone(), l)))
            .ok_or_else(|| StoreError::UnknownList(list_id.clone()))?;
        self.publish(
            &workspace,
            BoardEvent::ListDeleted {
                list_id: list_id.clone(),
            },
        );
        Ok((workspace, removed))
    }

    /// Apply a reorder batch atomically. Every referenced task and list must
    /// exist in `workspace`; otherwise nothing is written.
    ///
    /// Returns (and broadcasts) the committed order of every list the batch
    /// touched (target lists and the lists moved tasks came from), in board
    /// order.
    pub fn reorder(
        &self,
        workspace: &WorkspaceId,
        updates: &[PositionUpdate],
    ) -> Result<Vec<PositionUpdate>, StoreError> {
        let mut boards = self.boards();
        let store = boards
            .get_mut(workspace)
            .ok_or_else(|| StoreError::UnknownWorkspace(workspace.clone()))?;

        let mut touched = BTreeSet::new();
        for update in updates {
            let current = store
                .task(&update.id)
                .ok_or_else(|| StoreError::UnknownTask(update.id.clone()))?;
            if store.list(&update.list_id).is_none() {
                return Err(StoreError::UnknownList(update.list_id.clone()));
            }
            touched.insert(current.list_id.clone());
            touched.insert(update.list_id.clone());
        }

        store.apply_positions(updates);

        let committed: Vec<PositionUpdate> = store
            .lists()
            .iter()
            .filter(|l| touched.contains(l.id()))
            .flat_map(|l| {
                l.tasks
                    .iter()
                    .map(|t| PositionUpdate::new(t.id.clone(), t.list_id.clone(), t.position))
            })
            .collect();
        self.publish(workspace, BoardEvent::TasksReordered(committed.clone()));
        Ok(committed)
    }
}

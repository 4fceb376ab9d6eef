use serde::{Deserialize, Serialize};

use crate::ids::{ListId, TaskId, WorkspaceId};

/// A Kanban column. Lists are ordered by insertion; `position` is carried
/// through from the store but never used for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    #[serde(alias = "workspaceId")]
    pub workspace_id: WorkspaceId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A card. `position` is the dense zero-based rank within `list_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(alias = "listId")]
    pub list_id: ListId,
    pub title: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A list together with its tasks, sorted ascending by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardList {
    #[serde(flatten)]
    pub list: List,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl BoardList {
    pub fn new(list: List) -> Self {
        Self {
            list,
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> &ListId {
        &self.list.id
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }
}

/// What the board view renders: every list of one workspace with its tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub lists: Vec<BoardList>,
}

impl BoardSnapshot {
    pub fn list(&self, id: &ListId) -> Option<&BoardList> {
        self.lists.iter().find(|l| &l.list.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.lists
            .iter()
            .flat_map(|l| l.tasks.iter())
            .find(|t| &t.id == id)
    }

    pub fn task_count(&self) -> usize {
        self.lists.iter().map(|l| l.tasks.len()).sum()
    }
}

/// One entry of a reorder batch: where a task lives and at which rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(alias = "taskId", alias = "task_id")]
    pub id: TaskId,
    #[serde(alias = "listId")]
    pub list_id: ListId,
    pub position: u32,
}

impl PositionUpdate {
    pub fn new(id: impl Into<TaskId>, list_id: impl Into<ListId>, position: u32) -> Self {
        Self {
            id: id.into(),
            list_id: list_id.into(),
            position,
        }
    }
}

//! Realtime event vocabulary.
//!
//! The channel carries `{"event": <name>, "payload": <json>}` envelopes. The
//! five task-board events are decoded into [`BoardEvent`] at the bridge
//! boundary; anything else on the channel (chat, presence, calls) is an
//! unknown event and ignored. Envelopes relayed over a socket also carry the
//! `room` they were published to.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskboard_common::{List, ListId, PositionUpdate, Task, TaskId, WorkspaceId};

use crate::errors::EventError;

pub const LIST_CREATED: &str = "task:list_created";
pub const TASK_CREATED: &str = "task:task_created";
pub const TASKS_REORDERED: &str = "task:tasks_reordered";
pub const TASK_DELETED: &str = "task:task_deleted";
pub const LIST_DELETED: &str = "task:list_deleted";

pub const JOIN_WORKSPACE: &str = "joinWorkspace";
pub const LEAVE_WORKSPACE: &str = "leaveWorkspace";
/// Sent by the server once a join is live.
pub const JOINED_WORKSPACE: &str = "joinedWorkspace";

/// Raw envelope as it travels over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<WorkspaceId>,
}

impl ChannelMessage {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            room: None,
        }
    }

    pub fn in_room(mut self, workspace: WorkspaceId) -> Self {
        self.room = Some(workspace);
        self
    }

    pub fn joined(workspace: WorkspaceId) -> Self {
        Self::new(JOINED_WORKSPACE, Value::String(workspace.to_string())).in_room(workspace)
    }
}

/// A decoded task-board event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    ListCreated(List),
    TaskCreated(Task),
    TasksReordered(Vec<PositionUpdate>),
    TaskDeleted { task_id: TaskId, list_id: ListId },
    ListDeleted { list_id: ListId },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDeletedPayload {
    #[serde(alias = "task_id")]
    task_id: TaskId,
    #[serde(alias = "list_id")]
    list_id: ListId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDeletedPayload {
    #[serde(alias = "list_id")]
    list_id: ListId,
}

/// Reorder batches arrive either bare or wrapped the way the REST body is.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReorderPayload {
    Bare(Vec<PositionUpdate>),
    Wrapped { tasks: Vec<PositionUpdate> },
}

impl BoardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListCreated(_) => LIST_CREATED,
            Self::TaskCreated(_) => TASK_CREATED,
            Self::TasksReordered(_) => TASKS_REORDERED,
            Self::TaskDeleted { .. } => TASK_DELETED,
            Self::ListDeleted { .. } => LIST_DELETED,
        }
    }

    /// Decode and validate a payload for `event`.
    pub fn decode(event: &str, payload: &Value) -> Result<Self, EventError> {
        let decoded = match event {
            LIST_CREATED => Self::ListCreated(parse(event, payload)?),
            TASK_CREATED => Self::TaskCreated(parse(event, payload)?),
            TASKS_REORDERED => match parse::<ReorderPayload>(event, payload)? {
                ReorderPayload::Bare(updates) | ReorderPayload::Wrapped { tasks: updates } => {
                    Self::TasksReordered(updates)
                }
            },
            TASK_DELETED => {
                let p: TaskDeletedPayload = parse(event, payload)?;
                Self::TaskDeleted {
                    task_id: p.task_id,
                    list_id: p.list_id,
                }
            }
            LIST_DELETED => {
                let p: ListDeletedPayload = parse(event, payload)?;
                Self::ListDeleted { list_id: p.list_id }
            }
            other => return Err(EventError::UnknownEvent(other.to_string())),
        };
        decoded.validate()?;
        Ok(decoded)
    }

    pub fn from_message(msg: &ChannelMessage) -> Result<Self, EventError> {
        Self::decode(&msg.event, &msg.payload)
    }

    fn validate(&self) -> Result<(), EventError> {
        let event = self.name();
        match self {
            Self::ListCreated(list) => {
                require_id(event, "id", list.id.is_empty())?;
                require_id(event, "workspace_id", list.workspace_id.is_empty())?;
                require_title(event, &list.title)
            }
            Self::TaskCreated(task) => {
                require_id(event, "id", task.id.is_empty())?;
                require_id(event, "list_id", task.list_id.is_empty())?;
                require_title(event, &task.title)
            }
            Self::TasksReordered(updates) => {
                for update in updates {
                    require_id(event, "id", update.id.is_empty())?;
                    require_id(event, "list_id", update.list_id.is_empty())?;
                }
                Ok(())
            }
            Self::TaskDeleted { task_id, list_id } => {
                require_id(event, "taskId", task_id.is_empty())?;
                require_id(event, "listId", list_id.is_empty())
            }
            Self::ListDeleted { list_id } => require_id(event, "listId", list_id.is_empty()),
        }
    }

    fn payload(&self) -> Value {
        let encoded = match self {
            Self::ListCreated(list) => serde_json::to_value(list),
            Self::TaskCreated(task) => serde_json::to_value(task),
            Self::TasksReordered(updates) => serde_json::to_value(updates),
            Self::TaskDeleted { task_id, list_id } => serde_json::to_value(TaskDeletedPayload {
                task_id: task_id.clone(),
                list_id: list_id.clone(),
            }),
            Self::ListDeleted { list_id } => serde_json::to_value(ListDeletedPayload {
                list_id: list_id.clone(),
            }),
        };
        // Plain data structs with string keys always serialize.
        encoded.unwrap_or(Value::Null)
    }

    pub fn to_message(&self) -> ChannelMessage {
        ChannelMessage::new(self.name(), self.payload())
    }
}

fn parse<T: for<'de> Deserialize<'de>>(event: &str, payload: &Value) -> Result<T, EventError> {
    T::deserialize(payload).map_err(|e| EventError::malformed(event, e.to_string()))
}

fn require_id(event: &str, field: &str, blank: bool) -> Result<(), EventError> {
    if blank {
        return Err(EventError::malformed(event, format!("empty {}", field)));
    }
    Ok(())
}

fn require_title(event: &str, title: &str) -> Result<(), EventError> {
    if title.trim().is_empty() {
        return Err(EventError::malformed(event, "empty title"));
    }
    Ok(())
}

/// Room membership requests sent by a client over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    JoinWorkspace(WorkspaceId),
    LeaveWorkspace(WorkspaceId),
}

impl ControlMessage {
    pub fn to_message(&self) -> ChannelMessage {
        let (event, id) = match self {
            Self::JoinWorkspace(id) => (JOIN_WORKSPACE, id),
            Self::LeaveWorkspace(id) => (LEAVE_WORKSPACE, id),
        };
        ChannelMessage::new(event, Value::String(id.to_string()))
    }

    /// Returns `None` for envelopes that are not control messages.
    pub fn from_message(msg: &ChannelMessage) -> Option<Result<Self, EventError>> {
        let join = match msg.event.as_str() {
            JOIN_WORKSPACE => true,
            LEAVE_WORKSPACE => false,
            _ => return None,
        };
        let id = match WorkspaceId::deserialize(&msg.payload) {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => return Some(Err(EventError::malformed(&msg.event, "empty workspace id"))),
            Err(e) => return Some(Err(EventError::malformed(&msg.event, e.to_string()))),
        };
        Some(Ok(if join {
            Self::JoinWorkspace(id)
        } else {
            Self::LeaveWorkspace(id)
        }))
    }
}

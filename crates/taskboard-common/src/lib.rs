//! Shared domain types for the taskboard: identifiers, lists, tasks and the
//! reorder batch entry. Wire names follow the persistent store's rows
//! (`snake_case`) and accept the `camelCase` spellings the realtime server
//! emits.

pub mod ids;
pub mod models;

pub use ids::{ListId, TaskId, WorkspaceId};
pub use models::{BoardList, BoardSnapshot, List, PositionUpdate, Task};

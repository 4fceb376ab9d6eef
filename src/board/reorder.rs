//! Drag-reorder planning.
//!
//! A drop is turned into the full post-drop order of every list it touched,
//! expressed as `PositionUpdate`s. The same batch is applied to the local
//! store first and then persisted, so the store and the gateway never see
//! different orders.

use serde::{Deserialize, Serialize};
use taskboard_common::{ListId, PositionUpdate, TaskId};

use crate::board::store::BoardStore;
use crate::errors::ReorderError;

/// One end of a drag: a list and a zero-based slot in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragLocation {
    pub list_id: ListId,
    pub index: usize,
}

impl DragLocation {
    pub fn new(list_id: impl Into<ListId>, index: usize) -> Self {
        Self {
            list_id: list_id.into(),
            index,
        }
    }
}

/// A finished drag gesture. `destination` is `None` when the drop was
/// cancelled or landed outside any list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragResult {
    pub task_id: TaskId,
    pub source: DragLocation,
    pub destination: Option<DragLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub task_id: TaskId,
    /// Every task of every touched list, in board list order then rank.
    pub updates: Vec<PositionUpdate>,
    /// Touched lists in board order (one entry for same-list moves).
    pub touched: Vec<ListId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// No destination; nothing changes locally or remotely.
    Cancelled,
    /// The drop reproduces the current order; no write is needed.
    Unchanged,
    Moved(ReorderPlan),
}

impl ReorderOutcome {
    pub fn updates(&self) -> &[PositionUpdate] {
        match self {
            Self::Moved(plan) => &plan.updates,
            Self::Cancelled | Self::Unchanged => &[],
        }
    }

    pub fn is_noop(&self) -> bool {
        !matches!(self, Self::Moved(_))
    }
}

/// Compute the position updates for `drag` against the current board.
///
/// The destination index is clamped to the destination list's length after
/// the dragged task has been taken out. Fails when the gesture no longer
/// matches the board (a list vanished, or a concurrent event moved the task
/// away from the source slot); callers should resync in that case.
pub fn plan_reorder(store: &BoardStore, drag: &DragResult) -> Result<ReorderOutcome, ReorderError> {
    let Some(destination) = &drag.destination else {
        return Ok(ReorderOutcome::Cancelled);
    };

    let source = store
        .list(&drag.source.list_id)
        .ok_or_else(|| ReorderError::UnknownList(drag.source.list_id.clone()))?;
    let target = store
        .list(&destination.list_id)
        .ok_or_else(|| ReorderError::UnknownList(destination.list_id.clone()))?;

    let len = source.tasks.len();
    let dragged = source
        .tasks
        .get(drag.source.index)
        .ok_or_else(|| ReorderError::SourceOutOfRange {
            list_id: drag.source.list_id.clone(),
            index: drag.source.index,
            len,
        })?;
    if dragged.id != drag.task_id {
        return Err(ReorderError::TaskMismatch {
            expected: drag.task_id.clone(),
            found: dragged.id.clone(),
        });
    }

    let same_list = source.id() == target.id();
    let mut source_order: Vec<&TaskId> = source.tasks.iter().map(|t| &t.id).collect();
    source_order.remove(drag.source.index);

    let mut orders: Vec<(&ListId, Vec<&TaskId>)> = Vec::with_capacity(2);
    if same_list {
        let at = destination.index.min(source_order.len());
        source_order.insert(at, &dragged.id);
        orders.push((source.id(), source_order));
    } else {
        let mut target_order: Vec<&TaskId> = target.tasks.iter().map(|t| &t.id).collect();
        let at = destination.index.min(target_order.len());
        target_order.insert(at, &dragged.id);
        orders.push((source.id(), source_order));
        orders.push((target.id(), target_order));
    }

    // Board list order keeps the batch deterministic for a given board.
    let rank = |id: &ListId| store.lists().iter().position(|l| l.id() == id);
    orders.sort_by_key(|(id, _)| rank(*id));

    let updates: Vec<PositionUpdate> = orders
        .iter()
        .flat_map(|(list_id, order)| {
            order
                .iter()
                .enumerate()
                .map(move |(i, task_id)| PositionUpdate::new((*task_id).clone(), (*list_id).clone(), i as u32))
        })
        .collect();

    let unchanged = updates.iter().all(|u| {
        store
            .task(&u.id)
            .is_some_and(|t| t.list_id == u.list_id && t.position == u.position)
    });
    if unchanged {
        return Ok(ReorderOutcome::Unchanged);
    }

    Ok(ReorderOutcome::Moved(ReorderPlan {
        task_id: drag.task_id.clone(),
        updates,
        touched: orders.into_iter().map(|(id, _)| id.clone()).collect(),
    }))
}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskboard_common::{BoardList, BoardSnapshot, List, ListId, PositionUpdate, Task, TaskId, WorkspaceId};
use tokio::sync::watch;
use tracing::debug;

/// In-memory lists and ordered tasks for one workspace.
///
/// Every mutation is total: unknown list or task ids are dropped rather than
/// reported, since the authoritative state lives server-side and arrives
/// again through the event bridge or a resync. After every call each list's
/// task positions are exactly `0..n`.
#[derive(Debug, Clone)]
pub struct BoardStore {
    workspace_id: WorkspaceId,
    lists: Vec<BoardList>,
}

impl BoardStore {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            lists: Vec::new(),
        }
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn lists(&self) -> &[BoardList] {
        &self.lists
    }

    pub fn list(&self, id: &ListId) -> Option<&BoardList> {
        self.lists.iter().find(|l| &l.list.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.locate(id).map(|(l, t)| &self.lists[l].tasks[t])
    }

    /// Indices of a task as `(list index, task index)`.
    pub fn locate(&self, id: &TaskId) -> Option<(usize, usize)> {
        self.lists.iter().enumerate().find_map(|(li, list)| {
            list.tasks
                .iter()
                .position(|t| &t.id == id)
                .map(|ti| (li, ti))
        })
    }

    pub fn task_count(&self) -> usize {
        self.lists.iter().map(|l| l.tasks.len()).sum()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            lists: self.lists.clone(),
        }
    }

    fn list_index(&self, id: &ListId) -> Option<usize> {
        self.lists.iter().position(|l| &l.list.id == id)
    }

    /// Replace the whole board. Input is normalized: duplicate list or task
    /// ids keep their first occurrence, tasks are sorted by position and
    /// renumbered, and every task's `list_id` is set to its enclosing list.
    pub fn load_snapshot(&mut self, lists: Vec<BoardList>) {
        let mut seen_lists = HashSet::new();
        let mut seen_tasks = HashSet::new();
        self.lists.clear();

        for mut entry in lists {
            if !seen_lists.insert(entry.list.id.clone()) {
                debug!(list_id = %entry.list.id, "dropping duplicate list in snapshot");
                continue;
            }
            entry.tasks.sort_by_key(|t| t.position);
            entry.tasks.retain(|t| seen_tasks.insert(t.id.clone()));
            let list_id = entry.list.id.clone();
            for task in entry.tasks.iter_mut() {
                task.list_id = list_id.clone();
            }
            renumber(&mut entry.tasks);
            self.lists.push(entry);
        }
    }

    /// Append a list with no tasks. Returns false if the id is already on
    /// the board or the list belongs to another workspace.
    pub fn add_list(&mut self, list: List) -> bool {
        if list.workspace_id != self.workspace_id {
            debug!(list_id = %list.id, workspace = %list.workspace_id, "ignoring list from another workspace");
            return false;
        }
        if self.list_index(&list.id).is_some() {
            return false;
        }
        self.lists.push(BoardList::new(list));
        true
    }

    /// Remove a list and, with it, all of its tasks.
    pub fn remove_list(&mut self, list_id: &ListId) -> Option<BoardList> {
        let index = self.list_index(list_id)?;
        Some(self.lists.remove(index))
    }

    /// Append a task to the end of its list. No-op when the list is unknown
    /// or the task id already exists anywhere on the board.
    pub fn add_task(&mut self, task: Task) -> bool {
        let Some(index) = self.list_index(&task.list_id) else {
            debug!(task_id = %task.id, list_id = %task.list_id, "dropping task for unknown list");
            return false;
        };
        if self.locate(&task.id).is_some() {
            return false;
        }
        let tasks = &mut self.lists[index].tasks;
        tasks.push(task);
        renumber(tasks);
        true
    }

    /// Remove a task from the named list only.
    pub fn remove_task(&mut self, task_id: &TaskId, list_id: &ListId) -> Option<Task> {
        let index = self.list_index(list_id)?;
        let tasks = &mut self.lists[index].tasks;
        let position = tasks.iter().position(|t| &t.id == task_id)?;
        let removed = tasks.remove(position);
        renumber(tasks);
        Some(removed)
    }

    /// Remove a task from whichever list currently holds it.
    pub fn remove_task_anywhere(&mut self, task_id: &TaskId) -> Option<Task> {
        let (li, ti) = self.locate(task_id)?;
        let tasks = &mut self.lists[li].tasks;
        let removed = tasks.remove(ti);
        renumber(tasks);
        Some(removed)
    }

    /// Relocate tasks to the lists and ranks named by `updates`.
    ///
    /// When a task appears more than once the last entry wins. Updated tasks
    /// are pinned at their requested rank (clamped to the list length); tasks
    /// without an update fill the remaining slots in their existing order, so
    /// a partial batch still leaves every touched list dense. Applying the same
    /// batch twice yields the same board. Returns the number of updates that
    /// referenced a known task and list.
    pub fn apply_positions(&mut self, updates: &[PositionUpdate]) -> usize {
        let mut seen = HashSet::new();
        let mut latest: Vec<&PositionUpdate> = updates
            .iter()
            .rev()
            .filter(|u| seen.insert(&u.id))
            .collect();
        latest.reverse();

        let mut targets: Vec<(usize, &PositionUpdate)> = Vec::with_capacity(latest.len());
        for update in latest {
            if self.locate(&update.id).is_none() {
                debug!(task_id = %update.id, "dropping position update for unknown task");
                continue;
            }
            match self.list_index(&update.list_id) {
                Some(target) => targets.push((target, update)),
                None => {
                    debug!(task_id = %update.id, list_id = %update.list_id, "dropping position update for unknown list");
                }
            }
        }

        let mut touched: BTreeMap<usize, Vec<(u32, usize, Task)>> = BTreeMap::new();
        for (seq, (target, update)) in targets.iter().enumerate() {
            let Some((li, ti)) = self.locate(&update.id) else {
                continue;
            };
            let mut task = self.lists[li].tasks.remove(ti);
            task.list_id = update.list_id.clone();
            touched.entry(li).or_default();
            touched
                .entry(*target)
                .or_default()
                .push((update.position, seq, task));
        }

        let applied = targets.len();
        for (index, pinned) in touched {
            let rest = std::mem::take(&mut self.lists[index].tasks);
            let mut merged = merge_pinned(rest, pinned);
            renumber(&mut merged);
            self.lists[index].tasks = merged;
        }
        applied
    }

    /// Check the per-list invariants: dense positions, matching `list_id`,
    /// no task on two lists.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.lists.iter().all(|list| {
            list.tasks.iter().enumerate().all(|(i, t)| {
                t.position as usize == i && t.list_id == list.list.id && seen.insert(&t.id)
            })
        })
    }
}

/// Interleave pinned tasks at their requested slots with the rest in order.
fn merge_pinned(rest: Vec<Task>, mut pinned: Vec<(u32, usize, Task)>) -> Vec<Task> {
    pinned.sort_by_key(|(position, seq, _)| (*position, *seq));
    let mut out = Vec::with_capacity(rest.len() + pinned.len());
    let mut rest = rest.into_iter().peekable();
    let mut pinned = pinned.into_iter().peekable();

    loop {
        let slot = out.len();
        let next = match (pinned.peek(), rest.peek()) {
            (Some((position, _, _)), Some(_)) if *position as usize > slot => rest.next(),
            (Some(_), _) => pinned.next().map(|(_, _, task)| task),
            (None, _) => rest.next(),
        };
        match next {
            Some(task) => out.push(task),
            None => break,
        }
    }
    out
}

fn renumber(tasks: &mut [Task]) {
    for (i, task) in tasks.iter_mut().enumerate() {
        task.position = i as u32;
    }
}

/// Shared owner of the board for the currently mounted view.
///
/// The event bridge's listener task and in-flight gateway calls both reach
/// the store through this handle. Mutations name the workspace they were
/// issued for and are discarded when a different workspace (or none) is
/// open, so late completions from a previous workspace never leak into the
/// current board. The lock is never held across an await.
#[derive(Clone)]
pub struct BoardHandle {
    inner: Arc<Mutex<Option<BoardStore>>>,
    resync: Arc<AtomicBool>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for BoardHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardHandle {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(None)),
            resync: Arc::new(AtomicBool::new(false)),
            revision: Arc::new(revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<BoardStore>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Discard whatever is loaded and start an empty board for `workspace`.
    pub fn open(&self, workspace: WorkspaceId) {
        *self.lock() = Some(BoardStore::new(workspace));
        self.resync.store(false, Ordering::SeqCst);
        self.bump();
    }

    /// Discard the board. Returns the workspace that was open.
    pub fn close(&self) -> Option<WorkspaceId> {
        let closed = self.lock().take().map(|s| s.workspace_id);
        self.bump();
        closed
    }

    pub fn active_workspace(&self) -> Option<WorkspaceId> {
        self.lock().as_ref().map(|s| s.workspace_id.clone())
    }

    pub fn is_active(&self, workspace: &WorkspaceId) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|s| &s.workspace_id == workspace)
    }

    pub fn read<R>(&self, f: impl FnOnce(&BoardStore) -> R) -> Option<R> {
        self.lock().as_ref().map(f)
    }

    /// Mutate the store if `workspace` is still the open one.
    pub fn update<R>(
        &self,
        workspace: &WorkspaceId,
        f: impl FnOnce(&mut BoardStore) -> R,
    ) -> Option<R> {
        self.update_if(workspace, |store| (f(store), true))
    }

    /// Like [`update`](Self::update), but `f` reports whether it changed
    /// anything. The revision only moves when it did.
    pub fn update_if<R>(
        &self,
        workspace: &WorkspaceId,
        f: impl FnOnce(&mut BoardStore) -> (R, bool),
    ) -> Option<R> {
        let result = {
            let mut guard = self.lock();
            match guard.as_mut() {
                Some(store) if &store.workspace_id == workspace => Some(f(store)),
                _ => None,
            }
        };
        match result {
            Some((r, changed)) => {
                if changed {
                    self.bump();
                }
                Some(r)
            }
            None => {
                debug!(workspace = %workspace, "discarding mutation for inactive workspace");
                None
            }
        }
    }

    pub fn snapshot(&self) -> Option<BoardSnapshot> {
        self.read(BoardStore::snapshot)
    }

    /// Flag the board as drifted beyond what events can repair.
    pub fn request_resync(&self) {
        self.resync.store(true, Ordering::SeqCst);
    }

    pub fn resync_requested(&self) -> bool {
        self.resync.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_resync(&self) {
        self.resync.store(false, Ordering::SeqCst);
    }

    /// Monotonic counter bumped after every open, close and applied mutation.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ws() -> WorkspaceId {
        WorkspaceId::new("w1")
    }

    pub fn list(id: &str) -> List {
        List {
            id: ListId::new(id),
            workspace_id: ws(),
            title: format!("List {}", id),
            position: None,
            created_at: None,
        }
    }

    pub fn task(id: &str, list_id: &str, position: u32) -> Task {
        Task {
            id: TaskId::new(id),
            list_id: ListId::new(list_id),
            title: format!("Task {}", id),
            position,
            created_at: None,
        }
    }

    /// Build a store from `(list id, [task ids])` pairs in order.
    pub fn store_with(lists: &[(&str, &[&str])]) -> BoardStore {
        let mut store = BoardStore::new(ws());
        store.load_snapshot(
            lists
                .iter()
                .map(|(list_id, tasks)| BoardList {
                    list: list(list_id),
                    tasks: tasks
                        .iter()
                        .enumerate()
                        .map(|(i, t)| task(t, list_id, i as u32))
                        .collect(),
                })
                .collect(),
        );
        store
    }

    pub fn order(store: &BoardStore, list_id: &str) -> Vec<String> {
        store
            .list(&ListId::new(list_id))
            .map(|l| l.tasks.iter().map(|t| t.id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Wait (up to two seconds) for the open board to satisfy `cond`.
    pub async fn wait_until(handle: &BoardHandle, mut cond: impl FnMut(&BoardStore) -> bool) -> bool {
        let mut changes = handle.subscribe();
        let waited = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if handle.read(&mut cond).unwrap_or(false) {
                    return;
                }
                if changes.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        waited.is_ok() && handle.read(&mut cond).unwrap_or(false)
    }
}

//! One open workspace view: a board, its event bridge subscription, and the
//! gateway used to persist local intents.
//!
//! Creates wait for the server-assigned id before touching the board.
//! Deletes and moves are applied to the board first and never rolled back;
//! a failure that indicates drift (`NotFound`, a stale drag) flags the board
//! for [`BoardSession::resync`].

use std::sync::Arc;

use taskboard_common::{BoardSnapshot, List, ListId, Task, TaskId, WorkspaceId};
use tracing::{debug, info, warn};

use crate::board::bridge::{EventBridge, Subscription};
use crate::board::channel::EventChannel;
use crate::board::events::BoardEvent;
use crate::board::gateway::BoardApi;
use crate::board::reorder::{DragResult, ReorderOutcome, plan_reorder};
use crate::board::store::BoardHandle;
use crate::config::SyncSection;
use crate::errors::{GatewayError, ReorderError, SessionError};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Re-publish successful local mutations on the event channel, for
    /// backends that do not broadcast committed writes themselves.
    pub echo_local_mutations: bool,
}

impl SessionOptions {
    pub fn from_sync(sync: &SyncSection) -> Self {
        Self {
            echo_local_mutations: sync.echo_local_mutations,
        }
    }
}

pub struct BoardSession {
    workspace: WorkspaceId,
    api: Arc<dyn BoardApi>,
    channel: Arc<dyn EventChannel>,
    board: BoardHandle,
    subscription: Option<Subscription>,
    options: SessionOptions,
}

impl BoardSession {
    /// Open `workspace` on `board`, replacing whatever it held.
    ///
    /// The room is joined before the initial fetch so that no committed
    /// event can fall between the two. If the fetch fails the session is
    /// torn down again and the error returned.
    pub async fn open(
        workspace: WorkspaceId,
        api: Arc<dyn BoardApi>,
        channel: Arc<dyn EventChannel>,
        board: BoardHandle,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        board.open(workspace.clone());
        let subscription = match EventBridge::attach(channel.clone(), workspace.clone(), board.clone()).await {
            Ok(sub) => sub,
            Err(e) => {
                board.close();
                return Err(e.into());
            }
        };

        let session = Self {
            workspace,
            api,
            channel,
            board,
            subscription: Some(subscription),
            options,
        };
        if let Err(e) = session.resync().await {
            warn!(workspace = %session.workspace, error = %e, "initial board fetch failed");
            if let Err(close_err) = session.close().await {
                debug!(error = %close_err, "closing failed session");
            }
            return Err(e);
        }

        if let Ok(snapshot) = session.snapshot() {
            info!(
                workspace = %session.workspace,
                lists = snapshot.lists.len(),
                tasks = snapshot.task_count(),
                "opened board"
            );
        }
        Ok(session)
    }

    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    pub fn board(&self) -> &BoardHandle {
        &self.board
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.subscription.is_some() && self.board.is_active(&self.workspace) {
            Ok(())
        } else {
            Err(SessionError::Inactive(self.workspace.to_string()))
        }
    }

    pub fn snapshot(&self) -> Result<BoardSnapshot, SessionError> {
        self.ensure_active()?;
        self.board
            .read(|store| store.snapshot())
            .ok_or_else(|| SessionError::Inactive(self.workspace.to_string()))
    }

    /// False once the event channel has closed under this session.
    pub fn is_listening(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_listening)
    }

    pub fn needs_resync(&self) -> bool {
        self.board.resync_requested()
    }

    /// Replace the board with a fresh fetch. A failed fetch leaves the
    /// board flagged for another attempt.
    pub async fn resync(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.board.clear_resync();
        let lists = match self.api.fetch_board(&self.workspace).await {
            Ok(lists) => lists,
            Err(e) => {
                self.board.request_resync();
                return Err(e.into());
            }
        };
        self.board
            .update(&self.workspace, |store| store.load_snapshot(lists))
            .ok_or_else(|| SessionError::Inactive(self.workspace.to_string()))?;
        debug!(workspace = %self.workspace, "board resynced");
        Ok(())
    }

    /// Create a list. The board only changes once the server has assigned
    /// the id, and only if this workspace is still open by then.
    pub async fn create_list(&self, title: &str) -> Result<List, SessionError> {
        self.ensure_active()?;
        let list = self.api.create_list(&self.workspace, title).await?;
        if self
            .board
            .update(&self.workspace, |store| store.add_list(list.clone()))
            .is_none()
        {
            debug!(list_id = %list.id, "workspace closed before list creation completed");
        }
        self.echo(BoardEvent::ListCreated(list.clone())).await;
        Ok(list)
    }

    pub async fn create_task(&self, list_id: &ListId, title: &str) -> Result<Task, SessionError> {
        self.ensure_active()?;
        let task = self.api.create_task(&self.workspace, list_id, title).await?;
        if self
            .board
            .update(&self.workspace, |store| store.add_task(task.clone()))
            .is_none()
        {
            debug!(task_id = %task.id, "workspace closed before task creation completed");
        }
        self.echo(BoardEvent::TaskCreated(task.clone())).await;
        Ok(task)
    }

    /// Remove the task locally, then delete it server-side.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), SessionError> {
        self.ensure_active()?;
        let removed = self
            .board
            .update(&self.workspace, |store| store.remove_task_anywhere(task_id))
            .flatten();

        self.api
            .delete_task(task_id)
            .await
            .map_err(|e| self.note_failure(e))?;

        if let Some(task) = removed {
            self.echo(BoardEvent::TaskDeleted {
                task_id: task.id,
                list_id: task.list_id,
            })
            .await;
        }
        Ok(())
    }

    /// Remove the list and its tasks locally, then delete it server-side.
    pub async fn delete_list(&self, list_id: &ListId) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.board
            .update(&self.workspace, |store| store.remove_list(list_id));

        self.api
            .delete_list(list_id)
            .await
            .map_err(|e| self.note_failure(e))?;

        self.echo(BoardEvent::ListDeleted {
            list_id: list_id.clone(),
        })
        .await;
        Ok(())
    }

    /// Apply a drop to the board immediately, then persist the batch.
    ///
    /// Cancelled and no-op drops never reach the network.
    pub async fn move_task(&self, drag: &DragResult) -> Result<ReorderOutcome, SessionError> {
        self.ensure_active()?;
        let planned = self
            .board
            .update_if(&self.workspace, |store| -> (Result<ReorderOutcome, ReorderError>, bool) {
                match plan_reorder(store, drag) {
                    Ok(ReorderOutcome::Moved(plan)) => {
                        store.apply_positions(&plan.updates);
                        (Ok(ReorderOutcome::Moved(plan)), true)
                    }
                    other => (other, false),
                }
            })
            .ok_or_else(|| SessionError::Inactive(self.workspace.to_string()))?;

        let outcome = match planned {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(workspace = %self.workspace, task_id = %drag.task_id, error = %e, "drag no longer matches board");
                self.board.request_resync();
                return Err(SessionError::Reorder(e));
            }
        };

        let ReorderOutcome::Moved(plan) = &outcome else {
            debug!(task_id = %drag.task_id, ?outcome, "drop needs no write");
            return Ok(outcome);
        };

        self.api
            .reorder_tasks(&self.workspace, &plan.updates)
            .await
            .map_err(|e| self.note_failure(e))?;

        self.echo(BoardEvent::TasksReordered(plan.updates.clone())).await;
        Ok(outcome)
    }

    fn note_failure(&self, err: GatewayError) -> SessionError {
        if err.requires_resync() {
            self.board.request_resync();
        }
        warn!(workspace = %self.workspace, error = %err, "mutation failed; local board keeps optimistic state");
        SessionError::Gateway(err)
    }

    async fn echo(&self, event: BoardEvent) {
        if !self.options.echo_local_mutations {
            return;
        }
        if let Err(e) = self.channel.publish(&self.workspace, event.to_message()).await {
            warn!(workspace = %self.workspace, event = event.name(), error = %e, "failed to echo mutation");
        }
    }

    /// Leave the room and discard the board.
    pub async fn close(mut self) -> Result<(), SessionError> {
        let left = match self.subscription.take() {
            Some(sub) => sub.close().await,
            None => Ok(()),
        };
        if self.board.is_active(&self.workspace) {
            self.board.close();
        }
        debug!(workspace = %self.workspace, "closed board session");
        left.map_err(SessionError::from)
    }

    /// Close this workspace and open another on the same board, gateway and
    /// channel.
    pub async fn switch_to(self, workspace: WorkspaceId) -> Result<Self, SessionError> {
        let api = self.api.clone();
        let channel = self.channel.clone();
        let board = self.board.clone();
        let options = self.options.clone();
        self.close().await?;
        Self::open(workspace, api, channel, board, options).await
    }
}

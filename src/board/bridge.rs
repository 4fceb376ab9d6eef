//! Realtime event bridge.
//!
//! Attaching joins the workspace room and spawns a listener that applies
//! decoded events to the board in delivery order. The returned
//! [`Subscription`] is the only way to stop it: `close()` stops the listener
//! and leaves the room; dropping it aborts the listener and leaves on a
//! best-effort basis.

use std::sync::Arc;

use taskboard_common::WorkspaceId;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::board::channel::EventChannel;
use crate::board::events::{BoardEvent, ChannelMessage};
use crate::board::store::{BoardHandle, BoardStore};
use crate::errors::{ChannelError, EventError};

/// Apply one event to the store. Returns false when the event changed
/// nothing (duplicate delivery, an echo of a local write, or a reference to
/// an unknown entity).
pub fn apply_event(store: &mut BoardStore, event: &BoardEvent) -> bool {
    match event {
        BoardEvent::ListCreated(list) => store.add_list(list.clone()),
        BoardEvent::TaskCreated(task) => store.add_task(task.clone()),
        BoardEvent::TasksReordered(updates) => {
            let before = store.snapshot();
            store.apply_positions(updates) > 0 && store.snapshot() != before
        }
        BoardEvent::TaskDeleted { task_id, list_id } => store.remove_task(task_id, list_id).is_some(),
        BoardEvent::ListDeleted { list_id } => store.remove_list(list_id).is_some(),
    }
}

/// Decode `message` and apply it to `board` if `workspace` is still open.
pub(crate) fn handle_message(workspace: &WorkspaceId, board: &BoardHandle, message: &ChannelMessage) -> bool {
    let event = match BoardEvent::from_message(message) {
        Ok(event) => event,
        Err(EventError::UnknownEvent(name)) => {
            trace!(workspace = %workspace, event = %name, "ignoring non-board event");
            return false;
        }
        Err(e) => {
            warn!(workspace = %workspace, event = %message.event, error = %e, "dropping malformed event");
            return false;
        }
    };

    let applied = board.update_if(workspace, |store| {
        let changed = apply_event(store, &event);
        (changed, changed)
    });
    match applied {
        Some(true) => {
            debug!(workspace = %workspace, event = event.name(), "applied event");
            true
        }
        Some(false) => {
            debug!(workspace = %workspace, event = event.name(), "event referenced unknown or duplicate entity");
            false
        }
        None => false,
    }
}

async fn run_listener(
    mut rx: broadcast::Receiver<ChannelMessage>,
    mut stop: oneshot::Receiver<()>,
    workspace: WorkspaceId,
    board: BoardHandle,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            received = rx.recv() => match received {
                Ok(message) => {
                    handle_message(&workspace, &board, &message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(workspace = %workspace, skipped, "event listener lagged; board needs a resync");
                    board.request_resync();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(workspace = %workspace, "event channel closed");
                    break;
                }
            }
        }
    }
    debug!(workspace = %workspace, "event listener stopped");
}

pub struct EventBridge;

impl EventBridge {
    /// Join `workspace` on `channel` and start applying its events to `board`.
    pub async fn attach(
        channel: Arc<dyn EventChannel>,
        workspace: WorkspaceId,
        board: BoardHandle,
    ) -> Result<Subscription, ChannelError> {
        let rx = channel.join(&workspace).await?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_listener(rx, stop_rx, workspace.clone(), board));
        Ok(Subscription {
            channel,
            workspace,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }
}

/// A live room membership with its listener task.
pub struct Subscription {
    channel: Arc<dyn EventChannel>,
    workspace: WorkspaceId,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    pub fn is_listening(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the listener, wait for it to exit, then leave the room.
    pub async fn close(mut self) -> Result<(), ChannelError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(workspace = %self.workspace, error = %e, "event listener ended abnormally");
            }
        }
        self.channel.leave(&self.workspace).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        self.stop.take();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = self.channel.clone();
            let workspace = self.workspace.clone();
            runtime.spawn(async move {
                if let Err(e) = channel.leave(&workspace).await {
                    debug!(workspace = %workspace, error = %e, "leave after drop failed");
                }
            });
        }
    }
}

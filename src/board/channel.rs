//! Room-scoped publish/subscribe.
//!
//! [`EventChannel`] is the seam the bridge and session depend on. [`RoomHub`]
//! is the in-process implementation shared by the reference backend (which
//! publishes committed mutations) and any sessions running in the same
//! process. Rooms are keyed by workspace; each room is a `broadcast` channel,
//! so delivery order within a room is publish order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use taskboard_common::WorkspaceId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::board::events::ChannelMessage;
use crate::errors::ChannelError;

pub const DEFAULT_ROOM_CAPACITY: usize = 256;

#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Join the workspace room. Messages published after this returns are
    /// delivered to the receiver in publish order.
    async fn join(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError>;

    /// Leave the workspace room. Receivers obtained from `join` must be
    /// dropped by the caller.
    async fn leave(&self, workspace: &WorkspaceId) -> Result<(), ChannelError>;

    async fn publish(
        &self,
        workspace: &WorkspaceId,
        message: ChannelMessage,
    ) -> Result<(), ChannelError>;
}

#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<WorkspaceId, broadcast::Sender<ChannelMessage>>>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkspaceId, broadcast::Sender<ChannelMessage>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, workspace: &WorkspaceId) -> broadcast::Receiver<ChannelMessage> {
        self.lock()
            .entry(workspace.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver to every current member of the room. Returns how many
    /// receivers got the message; publishing to an empty room is not an error.
    pub fn broadcast(&self, workspace: &WorkspaceId, message: ChannelMessage) -> usize {
        let rooms = self.lock();
        match rooms.get(workspace) {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, workspace: &WorkspaceId) -> usize {
        self.lock()
            .get(workspace)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop the room if nobody is listening any more.
    pub fn prune(&self, workspace: &WorkspaceId) {
        let mut rooms = self.lock();
        if rooms.get(workspace).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(workspace);
            debug!(workspace = %workspace, "closed empty room");
        }
    }
}

#[async_trait]
impl EventChannel for RoomHub {
    async fn join(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError> {
        debug!(workspace = %workspace, "joining room");
        Ok(self.subscribe(workspace))
    }

    async fn leave(&self, workspace: &WorkspaceId) -> Result<(), ChannelError> {
        debug!(workspace = %workspace, "leaving room");
        self.prune(workspace);
        Ok(())
    }

    async fn publish(
        &self,
        workspace: &WorkspaceId,
        message: ChannelMessage,
    ) -> Result<(), ChannelError> {
        let delivered = self.broadcast(workspace, message);
        debug!(workspace = %workspace, delivered, "published to room");
        Ok(())
    }
}

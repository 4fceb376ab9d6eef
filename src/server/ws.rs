use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use taskboard_common::WorkspaceId;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::SharedState;
use crate::board::channel::RoomHub;
use crate::board::events::{ChannelMessage, ControlMessage};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered outbound envelopes per socket, across all joined rooms.
const OUTBOUND_CAPACITY: usize = 256;

// ── Room membership ──────────────────────────────────────────────────

/// The rooms one socket has joined. Each room gets a forwarder task that
/// copies room traffic into the socket's outbound queue.
pub struct RoomMembership {
    hub: RoomHub,
    out: mpsc::Sender<ChannelMessage>,
    rooms: HashMap<WorkspaceId, JoinHandle<()>>,
}

impl RoomMembership {
    pub fn new(hub: RoomHub, out: mpsc::Sender<ChannelMessage>) -> Self {
        Self {
            hub,
            out,
            rooms: HashMap::new(),
        }
    }

    /// Joining a room twice keeps a single forwarder. Every join is
    /// acknowledged once the room subscription exists.
    pub fn join(&mut self, workspace: WorkspaceId) {
        if !self.rooms.contains_key(&workspace) {
            let rx = self.hub.subscribe(&workspace);
            let handle = tokio::spawn(forward_room(workspace.clone(), rx, self.out.clone()));
            debug!(workspace = %workspace, "socket joined room");
            self.rooms.insert(workspace.clone(), handle);
        }
        if let Err(e) = self.out.try_send(ChannelMessage::joined(workspace.clone())) {
            warn!(workspace = %workspace, error = %e, "could not acknowledge join");
        }
    }

    pub fn leave(&mut self, workspace: &WorkspaceId) {
        if let Some(handle) = self.rooms.remove(workspace) {
            handle.abort();
            debug!(workspace = %workspace, "socket left room");
        }
    }

    pub fn is_member(&self, workspace: &WorkspaceId) -> bool {
        self.rooms.contains_key(workspace)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Apply one text frame from the client. Only join/leave envelopes have
    /// an effect; board mutations go through the REST API.
    pub fn handle_text(&mut self, text: &str) {
        let msg: ChannelMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable socket frame");
                return;
            }
        };
        match ControlMessage::from_message(&msg) {
            Some(Ok(ControlMessage::JoinWorkspace(ws))) => self.join(ws),
            Some(Ok(ControlMessage::LeaveWorkspace(ws))) => self.leave(&ws),
            Some(Err(e)) => warn!(error = %e, "ignoring malformed control message"),
            None => debug!(event = %msg.event, "ignoring client-sent event"),
        }
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        for (_, handle) in self.rooms.drain() {
            handle.abort();
        }
    }
}

async fn forward_room(
    workspace: WorkspaceId,
    mut rx: broadcast::Receiver<ChannelMessage>,
    out: mpsc::Sender<ChannelMessage>,
) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if out.send(msg.in_room(workspace.clone())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(workspace = %workspace, skipped, "socket fell behind room traffic");
            }
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sender, receiver) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let membership = RoomMembership::new(state.hub.clone(), out_tx);
    run_socket_loop(sender, receiver, membership, out_rx).await;
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards room traffic, applies join/leave frames, and exits when no Pong
/// arrives within [`PONG_TIMEOUT`] of a Ping. Dropping the membership on
/// exit stops every room forwarder.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut membership: RoomMembership,
    mut out_rx: mpsc::Receiver<ChannelMessage>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("socket missed pong deadline");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            outbound = out_rx.recv() => {
                let Some(msg) = outbound else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, event = %msg.event, "failed to serialize channel message");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Text(text))) => membership.handle_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!(rooms = membership.room_count(), "socket closed");
    drop(membership);
    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

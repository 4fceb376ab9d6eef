//! WebSocket [`EventChannel`] for clients running outside the backend
//! process.
//!
//! One socket carries every room the client has joined. Joins and leaves go
//! out as control envelopes; the server tags each relayed event with its
//! `room` and answers every join with `joinedWorkspace` once the
//! subscription is live, so events committed after `join` returns are never
//! missed. Untagged events are delivered to every joined room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use taskboard_common::WorkspaceId;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};

use crate::board::channel::{DEFAULT_ROOM_CAPACITY, EventChannel};
use crate::board::events::{ChannelMessage, ControlMessage, JOINED_WORKSPACE};
use crate::errors::ChannelError;

/// How long `join` waits for the server's acknowledgement.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const OUTBOUND_CAPACITY: usize = 64;

/// The `/ws` endpoint for a REST base URL (`http` → `ws`, `https` → `wss`).
pub fn socket_url(backend_url: &str) -> Result<String, ChannelError> {
    let mut url = Url::parse(backend_url)
        .map_err(|e| ChannelError::Transport(format!("invalid backend URL '{}': {}", backend_url, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::Transport(format!(
                "unsupported backend URL scheme '{}'",
                other
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::Transport(format!("cannot use {} for {}", scheme, backend_url)))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    Ok(url.to_string())
}

#[derive(Default)]
struct Rooms {
    senders: HashMap<WorkspaceId, broadcast::Sender<ChannelMessage>>,
    pending_joins: HashMap<WorkspaceId, Vec<oneshot::Sender<()>>>,
}

/// State shared between the channel handle and its reader task.
struct Shared {
    rooms: Mutex<Rooms>,
    closed: AtomicBool,
    capacity: usize,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(Rooms::default()),
            closed: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register a local receiver and a waiter for the join acknowledgement.
    fn subscribe(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<(broadcast::Receiver<ChannelMessage>, oneshot::Receiver<()>), ChannelError> {
        let mut rooms = self.lock();
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        rooms
            .pending_joins
            .entry(workspace.clone())
            .or_default()
            .push(ack_tx);
        let capacity = self.capacity;
        let rx = rooms
            .senders
            .entry(workspace.clone())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        Ok((rx, ack_rx))
    }

    /// Drop the local room if nobody listens to it. Returns true if it went.
    fn release(&self, workspace: &WorkspaceId) -> bool {
        let mut rooms = self.lock();
        if rooms
            .senders
            .get(workspace)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            rooms.senders.remove(workspace);
            rooms.pending_joins.remove(workspace);
            return true;
        }
        false
    }

    fn handle_frame(&self, text: &str) {
        let mut message: ChannelMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable socket frame");
                return;
            }
        };

        if message.event == JOINED_WORKSPACE {
            let room = message
                .room
                .clone()
                .or_else(|| WorkspaceId::deserialize(&message.payload).ok())
                .filter(|id| !id.is_empty());
            match room {
                Some(room) => self.acknowledge(&room),
                None => warn!("join acknowledgement without a workspace"),
            }
            return;
        }

        let rooms = self.lock();
        match message.room.take() {
            Some(room) => match rooms.senders.get(&room) {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => trace!(workspace = %room, event = %message.event, "event for a room we left"),
            },
            None => {
                for tx in rooms.senders.values() {
                    let _ = tx.send(message.clone());
                }
            }
        }
    }

    fn acknowledge(&self, workspace: &WorkspaceId) {
        if let Some(waiters) = self.lock().pending_joins.remove(workspace) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    /// Mark the socket dead and drop every room, so listeners see their
    /// receivers close and pending joins fail.
    fn shut_down(&self) {
        let mut rooms = self.lock();
        self.closed.store(true, Ordering::SeqCst);
        rooms.senders.clear();
        rooms.pending_joins.clear();
    }
}

async fn read_frames<S>(mut source: S, shared: Arc<Shared>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => shared.handle_frame(text.as_str()),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "server closed event socket");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "event socket read failed");
                break;
            }
        }
    }
    shared.shut_down();
    debug!("event socket reader stopped");
}

/// A connection to the backend's `/ws` endpoint.
///
/// Dropping it closes the socket; subscriptions still attached see their
/// channel close.
pub struct SocketChannel {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
}

impl SocketChannel {
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        Self::connect_with_capacity(url, DEFAULT_ROOM_CAPACITY).await
    }

    /// Connect with `capacity` buffered events per joined room.
    pub async fn connect_with_capacity(url: &str, capacity: usize) -> Result<Self, ChannelError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChannelError::Transport(format!("connecting to {}: {}", url, e)))?;
        info!(url, "event socket connected");

        let (mut sink, source) = stream.split();
        let shared = Arc::new(Shared::new(capacity));
        let (outbound, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

        let writer_shared = shared.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "event socket write failed");
                    writer_shared.shut_down();
                    return;
                }
            }
            // Best-effort close frame
            let _ = sink.send(Message::Close(None)).await;
        });
        let reader = tokio::spawn(read_frames(source, shared.clone()));

        Ok(Self {
            shared,
            outbound,
            reader,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    async fn send(&self, message: &ChannelMessage) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let text = serde_json::to_string(message)
            .map_err(|e| ChannelError::Transport(format!("encoding {}: {}", message.event, e)))?;
        self.outbound
            .send(Message::text(text))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.shut_down();
    }
}

#[async_trait]
impl EventChannel for SocketChannel {
    async fn join(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError> {
        let (rx, ack) = self.shared.subscribe(workspace)?;
        let joined = match self
            .send(&ControlMessage::JoinWorkspace(workspace.clone()).to_message())
            .await
        {
            Ok(()) => match tokio::time::timeout(JOIN_TIMEOUT, ack).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ChannelError::Closed),
                Err(_) => Err(ChannelError::Transport(format!(
                    "join of workspace {} was not acknowledged within {:?}",
                    workspace, JOIN_TIMEOUT
                ))),
            },
            Err(e) => Err(e),
        };

        match joined {
            Ok(()) => {
                debug!(workspace = %workspace, "joined room over socket");
                Ok(rx)
            }
            Err(e) => {
                drop(rx);
                self.shared.release(workspace);
                Err(e)
            }
        }
    }

    /// Leaving a dead socket succeeds: the server dropped its membership
    /// along with the connection.
    async fn leave(&self, workspace: &WorkspaceId) -> Result<(), ChannelError> {
        if !self.shared.release(workspace) {
            debug!(workspace = %workspace, "room still has local listeners; staying");
            return Ok(());
        }
        match self
            .send(&ControlMessage::LeaveWorkspace(workspace.clone()).to_message())
            .await
        {
            Ok(()) => {
                debug!(workspace = %workspace, "left room over socket");
                Ok(())
            }
            Err(ChannelError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn publish(
        &self,
        workspace: &WorkspaceId,
        message: ChannelMessage,
    ) -> Result<(), ChannelError> {
        self.send(&message.in_room(workspace.clone())).await
    }
}

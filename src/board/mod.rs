//! Task board sync core.
//!
//! ## Overview
//!
//! Keeps one workspace's Kanban lists and tasks consistent across clients
//! using REST mutations, a room-scoped event channel, and optimistic
//! drag-reordering.
//!
//! ## Module Map
//!
//! ```text
//!   drag / create / delete
//!            │
//!            v
//! ┌────────────────────────────────────────────────────────────┐
//! │ session.rs  (BoardSession: one per open workspace)         │
//! │   ├─ reorder.rs  plan_reorder() → Vec<PositionUpdate>      │
//! │   ├─ store.rs    BoardStore behind BoardHandle             │
//! │   ├─ gateway.rs  BoardApi ── HttpGateway ──> REST backend   │
//! │   └─ bridge.rs   Subscription ──> EventChannel (room)       │
//! │                      │                                     │
//! │                      │ BoardEvent::decode()  (events.rs)   │
//! │                      v                                     │
//! │                  apply_event() → BoardStore                │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `store`    | Invariant-preserving board mutations, shared handle     |
//! | `reorder`  | Drag gesture → full post-drop order of touched lists    |
//! | `gateway`  | Bearer-authenticated REST calls, retry for idempotent   |
//! | `events`   | Channel envelope, `BoardEvent`, join/leave messages     |
//! | `channel`  | `EventChannel` trait, in-process `RoomHub`              |
//! | `socket`   | `SocketChannel`: the same rooms over the backend's `/ws` |
//! | `bridge`   | Listener task applying room events to the board         |
//! | `session`  | Wires the above together for one workspace view         |
//!
//! ## Drag Flow
//!
//! 1. `BoardSession::move_task()` plans the drop against the current board.
//! 2. The batch is applied to the store before any await.
//! 3. `BoardApi::reorder_tasks()` persists the same batch.
//! 4. The backend broadcasts `task:tasks_reordered`; every bridge in the
//!    room, including ours, applies it (a repeat application is a no-op).

pub mod bridge;
pub mod channel;
pub mod events;
pub mod gateway;
pub mod reorder;
pub mod session;
pub mod socket;
pub mod store;

pub use bridge::{EventBridge, Subscription, apply_event};
pub use channel::{EventChannel, RoomHub};
pub use events::{BoardEvent, ChannelMessage, ControlMessage};
pub use gateway::{BoardApi, CredentialProvider, HttpGateway, RetryPolicy, StaticToken};
pub use reorder::{DragLocation, DragResult, ReorderOutcome, ReorderPlan, plan_reorder};
pub use session::{BoardSession, SessionOptions};
pub use socket::{SocketChannel, socket_url};
pub use store::{BoardHandle, BoardStore};

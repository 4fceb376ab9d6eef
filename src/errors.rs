//! Typed error hierarchy for the taskboard sync core.
//!
//! - `GatewayError` — REST mutation failures, classified for the caller
//! - `EventError` — inbound realtime payloads the bridge cannot use
//! - `ChannelError` — event channel transport failures
//! - `ReorderError` — drag gestures that no longer match the board
//! - `SessionError` — everything a `BoardSession` operation can surface
//!
//! Board Store operations are total and have no error type.

use taskboard_common::{ListId, TaskId};
use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Failures from the persistent store's REST API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or expired credential; the identity provider must re-authenticate.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A stale id. The caller should request a full resync.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient transport or server failure; safe to retry idempotent calls.
    #[error("Network failure calling {url}: {message}")]
    NetworkFailure { url: String, message: String },

    #[error("Request to {url} rejected with status {status}: {body}")]
    Rejected { url: String, status: u16, body: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, url: &str, body: &str) -> Self {
        let body = preview_body(body);
        match status {
            401 | 403 => Self::Unauthorized(format!("{} returned {}: {}", url, status, body)),
            404 => Self::NotFound(format!("{} returned 404: {}", url, body)),
            408 | 429 | 500..=599 => Self::NetworkFailure {
                url: url.to_string(),
                message: format!("status {}: {}", status, body),
            },
            _ => Self::Rejected {
                url: url.to_string(),
                status,
                body,
            },
        }
    }

    /// Classify a transport error. Anything that never produced a usable
    /// response counts as a network failure.
    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_decode() {
            return Self::Decode {
                url: url.to_string(),
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), url, &err.to_string());
        }
        Self::NetworkFailure {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Inbound realtime payloads the bridge drops.
#[derive(Debug, Error)]
pub enum EventError {
    /// Not a task-board event (chat, presence, ...). Ignored without noise.
    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Malformed '{event}' payload: {reason}")]
    MalformedEvent { event: String, reason: String },
}

impl EventError {
    pub fn malformed(event: &str, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Event channel closed")]
    Closed,

    #[error("Event channel transport error: {0}")]
    Transport(String),
}

/// A drag gesture that does not match the current board.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("List {0} is not on the board")]
    UnknownList(ListId),

    #[error("Source index {index} out of range for list {list_id} ({len} tasks)")]
    SourceOutOfRange {
        list_id: ListId,
        index: usize,
        len: usize,
    },

    #[error("Expected task {expected} at the drag source, found {found}")]
    TaskMismatch { expected: TaskId, found: TaskId },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Board session for workspace {0} is no longer active")]
    Inactive(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Reorder(#[from] ReorderError),
}

impl SessionError {
    pub fn requires_resync(&self) -> bool {
        match self {
            Self::Gateway(e) => e.requires_resync(),
            Self::Reorder(_) => true,
            _ => false,
        }
    }
}

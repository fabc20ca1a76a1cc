//! Terminal session record

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use super::stream::StreamWriter;

/// Identifier of a terminal session, issued by the runtime when the stream opens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifies the single client connection that receives a session's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(Uuid);

impl RoutingKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoutingKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Session lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit close from the client or an admin
    Requested,
    /// The process inside the container ended its output
    Eof,
    /// Reading or writing the stream failed
    StreamError,
    /// Closed by the idle reaper
    Idle,
    /// The owning client connection went away
    Disconnected,
    /// The server is shutting down
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Requested => "requested",
            CloseReason::Eof => "eof",
            CloseReason::StreamError => "stream_error",
            CloseReason::Idle => "idle",
            CloseReason::Disconnected => "disconnected",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    last_activity: DateTime<Utc>,
    close_reason: Option<CloseReason>,
}

/// A live interactive connection to a container
pub struct TerminalSession {
    pub id: SessionId,

    /// Container the session is attached to
    pub target: String,

    pub routing_key: RoutingKey,

    pub created_at: DateTime<Utc>,

    /// State and activity share one lock so idle checks and input updates cannot interleave
    lifecycle: Mutex<Lifecycle>,

    /// Write half of the stream; the read half belongs to the output pump
    writer: Mutex<Box<dyn StreamWriter>>,

    /// Flips to true once the session leaves `Active`
    closing: watch::Sender<bool>,
}

impl TerminalSession {
    pub fn new(
        id: SessionId,
        target: String,
        routing_key: RoutingKey,
        writer: Box<dyn StreamWriter>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            target,
            routing_key,
            created_at: now,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Active,
                last_activity: now,
                close_reason: None,
            }),
            writer: Mutex::new(writer),
            closing: watch::Sender::new(false),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.lifecycle.lock().await.state
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == SessionState::Active
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.lifecycle.lock().await.last_activity
    }

    /// Reason recorded when the session left `Active`
    pub async fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().await.close_reason
    }

    /// Record input activity. Returns false if the session is no longer active.
    pub(crate) async fn touch(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SessionState::Active {
            return false;
        }
        lifecycle.last_activity = Utc::now();
        true
    }

    /// Move `Active -> Closing`. Returns false if another path got there first.
    pub(crate) async fn begin_close(&self, reason: CloseReason) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SessionState::Active {
            return false;
        }
        lifecycle.state = SessionState::Closing;
        lifecycle.close_reason = Some(reason);
        self.closing.send_replace(true);
        true
    }

    /// Move `Active -> Closing` only if there has been no activity since `cutoff`.
    pub(crate) async fn begin_close_if_idle(&self, cutoff: DateTime<Utc>) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SessionState::Active || lifecycle.last_activity >= cutoff {
            return false;
        }
        lifecycle.state = SessionState::Closing;
        lifecycle.close_reason = Some(CloseReason::Idle);
        self.closing.send_replace(true);
        true
    }

    /// Final transition. Returns the reason the session closed.
    pub(crate) async fn mark_closed(&self, fallback: CloseReason) -> CloseReason {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.state = SessionState::Closed;
        self.closing.send_replace(true);
        *lifecycle.close_reason.get_or_insert(fallback)
    }

    /// Resolves once the session has left `Active`.
    pub(crate) async fn closed(&self) {
        let mut rx = self.closing.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|closing| *closing).await;
    }

    pub(crate) async fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.lock().await.write(bytes).await
    }

    pub(crate) async fn close_stream(&self) -> std::io::Result<()> {
        self.writer.lock().await.close().await
    }

    #[cfg(test)]
    pub(crate) async fn set_last_activity(&self, at: DateTime<Utc>) {
        self.lifecycle.lock().await.last_activity = at;
    }
}

impl fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("routing_key", &self.routing_key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Thread-safe session handle
pub type SessionHandle = Arc<TerminalSession>;

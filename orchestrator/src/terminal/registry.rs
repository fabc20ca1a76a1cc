//! Session registry
//!
//! The only structure shared between request handlers, output pumps and the idle
//! reaper. Every operation takes the single map lock, so a session is either fully
//! registered or not visible at all.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::error::{Result, TerminalError};
use super::session::{SessionHandle, SessionId};

/// Concurrent mapping from session id to session
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Fails with `Conflict` if the id is already present.
    pub async fn register(&self, session: SessionHandle) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(TerminalError::Conflict(session.id.clone()));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    pub async fn lookup(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TerminalError::SessionNotFound(id.clone()))
    }

    /// Remove a session. Returns the removed handle; absent ids are not an error.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    /// Point-in-time copy of all registered sessions
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

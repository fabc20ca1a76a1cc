//! Wire events exchanged with terminal clients
//!
//! Both directions are JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

use super::session::{CloseReason, SessionId};

/// Events sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Open a shell in a container
    Init { container_id: String },

    /// Keystrokes for a session
    Input { session_id: SessionId, data: String },

    Resize {
        session_id: SessionId,
        rows: u16,
        cols: u16,
    },

    Close { session_id: SessionId },
}

/// Events sent to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected,

    Ready { session_id: SessionId },

    Output { session_id: SessionId, data: String },

    /// Terminal event for a session, nothing follows it
    Closed {
        session_id: SessionId,
        reason: CloseReason,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            session_id,
            message: message.into(),
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ServerEvent::Connected => None,
            ServerEvent::Ready { session_id }
            | ServerEvent::Output { session_id, .. }
            | ServerEvent::Closed { session_id, .. } => Some(session_id),
            ServerEvent::Error { session_id, .. } => session_id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_client_event_parsing() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "resize",
            "session_id": "abc",
            "rows": 40,
            "cols": 120
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::Resize {
                session_id: SessionId::from("abc"),
                rows: 40,
                cols: 120,
            }
        );
    }

    #[test]
    fn test_server_event_shape() {
        let closed = ServerEvent::Closed {
            session_id: SessionId::from("abc"),
            reason: CloseReason::Idle,
        };
        assert_eq!(
            serde_json::to_value(&closed).unwrap(),
            json!({"type": "closed", "session_id": "abc", "reason": "idle"})
        );

        let error = ServerEvent::error(None, "Missing container id");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "message": "Missing container id"})
        );
    }
}

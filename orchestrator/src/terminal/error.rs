//! Errors raised by the terminal session bridge

use thiserror::Error;

use super::session::SessionId;

/// Terminal bridge error types
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Container is not running: {0}")]
    InvalidState(String),

    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Terminal session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Terminal session already registered: {0}")]
    Conflict(SessionId),
}

impl TerminalError {
    /// Short label used for metrics and wire errors
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalError::NotFound(_) => "not_found",
            TerminalError::InvalidState(_) => "invalid_state",
            TerminalError::Unavailable(_) => "unavailable",
            TerminalError::SessionNotFound(_) => "session_not_found",
            TerminalError::Conflict(_) => "conflict",
        }
    }
}

pub type Result<T> = std::result::Result<T, TerminalError>;

//! Raw interactive stream abstraction
//!
//! A provider opens a bidirectional byte channel attached to a process inside a
//! container. The channel is handed out already split: the read half goes to the
//! session's output pump, the write half stays with the session for input and close.

use std::io;
use std::time::Duration;

use async_trait::async_trait;

use super::error::Result;
use super::session::SessionId;

/// Result of a single bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes became available
    Data(Vec<u8>),
    /// The remote side closed the stream
    Eof,
    /// Nothing arrived within the timeout
    Timeout,
}

/// Read half of an interactive stream
#[async_trait]
pub trait StreamReader: Send {
    /// Wait at most `timeout` for the next chunk of output.
    async fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome>;
}

/// Write half of an interactive stream
#[async_trait]
pub trait StreamWriter: Send {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Close the stream. Calling this more than once is a no-op.
    async fn close(&mut self) -> io::Result<()>;
}

/// A freshly opened interactive stream
pub struct ExecStream {
    /// Runtime-issued identifier, used as the session id
    pub id: SessionId,
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Opens, resizes and describes interactive streams on a container runtime
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Start `command` inside `target` with a pseudo-terminal attached.
    async fn open(&self, target: &str, command: &[String]) -> Result<ExecStream>;

    /// Change the terminal size of an open stream.
    async fn resize(&self, stream_id: &SessionId, rows: u16, cols: u16) -> Result<()>;

    /// Version string reported by the runtime, if it is reachable.
    async fn runtime_version(&self) -> Option<String>;
}

//! Interactive terminal sessions bridged to client connections
//!
//! - `manager`: open/input/resize/close, the public contract
//! - `pump`: one output task per live session
//! - `reaper`: closes sessions left idle
//! - `registry`: the shared session table
//! - `docker`: the Docker Engine stream provider
//! - `wire`: client event dispatch

pub mod docker;
pub mod error;
pub mod events;
pub mod manager;
mod pump;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use docker::DockerStreamProvider;
pub use error::TerminalError;
pub use events::{ClientEvent, ServerEvent};
pub use manager::SessionManager;
pub use pump::Utf8Decoder;
pub use reaper::IdleReaper;
pub use registry::SessionRegistry;
pub use session::{CloseReason, RoutingKey, SessionHandle, SessionId, SessionState, TerminalSession};
pub use stream::{ExecStream, ReadOutcome, StreamProvider, StreamReader, StreamWriter};
pub use transport::{ConnectionHub, Transport};

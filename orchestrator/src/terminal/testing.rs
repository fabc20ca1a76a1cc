//! In-memory collaborators for exercising the session bridge without a runtime

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::error::{Result, TerminalError};
use super::events::ServerEvent;
use super::session::{RoutingKey, SessionId};
use super::stream::{ExecStream, ReadOutcome, StreamProvider, StreamReader, StreamWriter};
use super::transport::Transport;

/// Writer that accepts and discards everything
pub struct NullWriter;

#[async_trait]
impl StreamWriter for NullWriter {
    async fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose close never completes, like a wedged runtime connection
pub struct HangingWriter;

#[async_trait]
impl StreamWriter for HangingWriter {
    async fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl StreamReader for ChannelReader {
    async fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(ReadOutcome::Timeout),
            Ok(None) => Ok(ReadOutcome::Eof),
            Ok(Some(bytes)) => Ok(ReadOutcome::Data(bytes)),
        }
    }
}

pub struct ChannelWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl StreamWriter for ChannelWriter {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))?;
        tx.send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "process exited"))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.tx.take();
        Ok(())
    }
}

/// Container-side ends of a fake stream, held by the test
pub struct FakeProcess {
    /// Bytes pushed here appear as session output
    pub output: mpsc::UnboundedSender<Vec<u8>>,
    /// Bytes written by the session arrive here
    pub input: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Build a connected reader/writer pair and the process ends behind them
pub fn channel_stream(id: &str) -> (ExecStream, FakeProcess) {
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let stream = ExecStream {
        id: SessionId::from(id),
        reader: Box::new(ChannelReader { rx: output_rx }),
        writer: Box::new(ChannelWriter { tx: Some(input_tx) }),
    };
    let process = FakeProcess {
        output: output_tx,
        input: input_rx,
    };
    (stream, process)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeContainer {
    Running,
    Stopped,
}

/// Stream provider backed by in-memory channels.
///
/// In the default mode the test drives each process by hand via `take_process`.
/// With `echo_shell` every stream is served by a tiny line-oriented shell that
/// echoes input and answers `echo <text>`; closing its stdin ends the process.
pub struct FakeProvider {
    containers: HashMap<String, FakeContainer>,
    echo_shell: bool,
    reachable: bool,
    next_id: AtomicU64,
    processes: Mutex<HashMap<SessionId, FakeProcess>>,
    pub resizes: Mutex<Vec<(SessionId, u16, u16)>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            containers: HashMap::new(),
            echo_shell: false,
            reachable: true,
            next_id: AtomicU64::new(1),
            processes: Mutex::new(HashMap::new()),
            resizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_container(mut self, name: &str, state: FakeContainer) -> Self {
        self.containers.insert(name.to_string(), state);
        self
    }

    pub fn with_echo_shell(mut self) -> Self {
        self.echo_shell = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub async fn take_process(&self, id: &SessionId) -> FakeProcess {
        self.processes
            .lock()
            .await
            .remove(id)
            .expect("no fake process for session")
    }
}

#[async_trait]
impl StreamProvider for FakeProvider {
    async fn open(&self, target: &str, _command: &[String]) -> Result<ExecStream> {
        if !self.reachable {
            return Err(TerminalError::Unavailable("connection refused".to_string()));
        }
        match self.containers.get(target) {
            None => return Err(TerminalError::NotFound(target.to_string())),
            Some(FakeContainer::Stopped) => {
                return Err(TerminalError::InvalidState(target.to_string()))
            }
            Some(FakeContainer::Running) => {}
        }

        let id = format!("exec-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (stream, process) = channel_stream(&id);

        if self.echo_shell {
            tokio::spawn(run_echo_shell(process));
        } else {
            self.processes.lock().await.insert(stream.id.clone(), process);
        }

        Ok(stream)
    }

    async fn resize(&self, stream_id: &SessionId, rows: u16, cols: u16) -> Result<()> {
        if !self.reachable {
            return Err(TerminalError::Unavailable("connection refused".to_string()));
        }
        self.resizes.lock().await.push((stream_id.clone(), rows, cols));
        Ok(())
    }

    async fn runtime_version(&self) -> Option<String> {
        self.reachable.then(|| "fake-1.0".to_string())
    }
}

async fn run_echo_shell(mut process: FakeProcess) {
    let mut line = Vec::new();
    let _ = process.output.send(b"$ ".to_vec());

    while let Some(chunk) = process.input.recv().await {
        // Terminal echo
        let _ = process.output.send(chunk.clone());

        for byte in chunk {
            if byte != b'\n' {
                line.push(byte);
                continue;
            }
            let command = String::from_utf8_lossy(&line).trim().to_string();
            line.clear();

            if command == "exit" {
                return;
            }
            if let Some(text) = command.strip_prefix("echo ") {
                let _ = process.output.send(format!("{}\r\n", text).into_bytes());
            }
            let _ = process.output.send(b"$ ".to_vec());
        }
    }
}

/// Transport that records every delivered event
#[derive(Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<(RoutingKey, ServerEvent)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(RoutingKey, ServerEvent)> {
        self.events.lock().await.clone()
    }

    pub async fn events_for(&self, session_id: &SessionId) -> Vec<ServerEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(_, event)| event.session_id() == Some(session_id))
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Concatenated output delivered for a session
    pub async fn output_for(&self, session_id: &SessionId) -> String {
        self.events_for(session_id)
            .await
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Output { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    pub async fn closed_count(&self, session_id: &SessionId) -> usize {
        self.events_for(session_id)
            .await
            .iter()
            .filter(|event| matches!(event, ServerEvent::Closed { .. }))
            .count()
    }

    /// Poll until `check` passes or the deadline expires
    pub async fn wait_until<F>(&self, deadline: Duration, mut check: F) -> bool
    where
        F: FnMut(&[(RoutingKey, ServerEvent)]) -> bool,
    {
        let start = tokio::time::Instant::now();
        loop {
            {
                let events = self.events.lock().await;
                if check(events.as_slice()) {
                    return true;
                }
            }
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, routing_key: &RoutingKey, event: ServerEvent) {
        self.events.lock().await.push((*routing_key, event));
    }
}

/// True once a `closed` event for `session_id` has been recorded
pub fn has_closed(events: &[(RoutingKey, ServerEvent)], session_id: &SessionId) -> bool {
    events.iter().any(|(_, event)| {
        matches!(event, ServerEvent::Closed { session_id: id, .. } if id == session_id)
    })
}

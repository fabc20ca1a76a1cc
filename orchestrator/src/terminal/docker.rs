//! Docker Engine stream provider
//!
//! Shells are started with the exec API: inspect the container, create an exec
//! with a pseudo-terminal and all three standard streams attached, then start it
//! attached and split the hijacked connection into read and write halves.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecResults};
use bollard::Docker;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::RuntimeConfig;

use super::error::{Result, TerminalError};
use super::session::SessionId;
use super::stream::{ExecStream, ReadOutcome, StreamProvider, StreamReader, StreamWriter};

type OutputStream = Pin<Box<dyn Stream<Item = std::result::Result<LogOutput, DockerError>> + Send>>;
type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Stream provider backed by the local Docker daemon
pub struct DockerStreamProvider {
    docker: Docker,
}

impl DockerStreamProvider {
    /// Build a client for the configured socket. No request is made yet.
    pub fn connect(config: &RuntimeConfig) -> anyhow::Result<Self> {
        let docker = match &config.docker_socket {
            Some(socket) => Docker::connect_with_unix(
                socket,
                config.request_timeout_secs,
                bollard::API_DEFAULT_VERSION,
            )?,
            None => Docker::connect_with_local_defaults()?
                .with_timeout(Duration::from_secs(config.request_timeout_secs)),
        };

        info!(socket = ?config.docker_socket, "Docker client configured");
        Ok(Self { docker })
    }

    async fn ensure_running(&self, target: &str) -> Result<()> {
        let inspect = self
            .docker
            .inspect_container(target, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(e, target))?;

        let running = inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);

        if !running {
            return Err(TerminalError::InvalidState(target.to_string()));
        }
        Ok(())
    }
}

/// Translate an engine error into the bridge's error kinds
fn map_docker_error(err: DockerError, target: &str) -> TerminalError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => TerminalError::NotFound(target.to_string()),
        // 409 is returned for paused or stopped containers
        DockerError::DockerResponseServerError {
            status_code: 409, ..
        } => TerminalError::InvalidState(target.to_string()),
        other => TerminalError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl StreamProvider for DockerStreamProvider {
    async fn open(&self, target: &str, command: &[String]) -> Result<ExecStream> {
        self.ensure_running(target).await?;

        let exec = self
            .docker
            .create_exec(
                target,
                CreateExecOptions::<String> {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    cmd: Some(command.to_vec()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_docker_error(e, target))?;

        debug!(exec_id = %exec.id, container_id = %target, "Exec instance created");

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_docker_error(e, target))?
        {
            StartExecResults::Attached { output, input } => Ok(ExecStream {
                id: SessionId::new(exec.id),
                reader: Box::new(DockerReader { output }),
                writer: Box::new(DockerWriter {
                    input,
                    closed: false,
                }),
            }),
            StartExecResults::Detached => Err(TerminalError::Unavailable(format!(
                "exec {} started detached",
                exec.id
            ))),
        }
    }

    async fn resize(&self, stream_id: &SessionId, rows: u16, cols: u16) -> Result<()> {
        self.docker
            .resize_exec(
                stream_id.as_str(),
                ResizeExecOptions {
                    height: rows,
                    width: cols,
                },
            )
            .await
            .map_err(|e| TerminalError::Unavailable(e.to_string()))
    }

    async fn runtime_version(&self) -> Option<String> {
        match self.docker.version().await {
            Ok(version) => version.version,
            Err(e) => {
                debug!(error = %e, "Docker version query failed");
                None
            }
        }
    }
}

struct DockerReader {
    output: OutputStream,
}

#[async_trait]
impl StreamReader for DockerReader {
    async fn read(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        match tokio::time::timeout(timeout, self.output.next()).await {
            Err(_) => Ok(ReadOutcome::Timeout),
            Ok(None) => Ok(ReadOutcome::Eof),
            Ok(Some(Ok(chunk))) => Ok(ReadOutcome::Data(chunk.into_bytes().to_vec())),
            Ok(Some(Err(e))) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    }
}

struct DockerWriter {
    input: InputSink,
    closed: bool,
}

#[async_trait]
impl StreamWriter for DockerWriter {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        self.input.write_all(bytes).await?;
        self.input.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.input.shutdown().await
    }
}

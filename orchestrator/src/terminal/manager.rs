//! Session manager: opens, feeds, resizes and closes terminal sessions

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::TerminalConfig;
use crate::models::SessionSummary;

use super::error::{Result, TerminalError};
use super::events::ServerEvent;
use super::pump::OutputPump;
use super::registry::SessionRegistry;
use super::session::{CloseReason, RoutingKey, SessionHandle, SessionId, TerminalSession};
use super::stream::StreamProvider;
use super::transport::Transport;

/// Orchestrates the lifecycle of all terminal sessions
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn StreamProvider>,
    transport: Arc<dyn Transport>,
    config: TerminalConfig,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn StreamProvider>,
        transport: Arc<dyn Transport>,
        config: TerminalConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            transport,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a shell in `target` whose output is routed to `routing_key`.
    ///
    /// The client receives `ready` before any output. On failure nothing is
    /// registered and an already opened stream is closed again.
    pub async fn open(&self, target: &str, routing_key: RoutingKey) -> Result<SessionId> {
        let opened = tokio::time::timeout(
            self.config.open_timeout(),
            self.provider.open(target, &self.config.shell_command),
        )
        .await;

        let stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                crate::metrics::record_open_failure(e.kind());
                warn!(container_id = %target, error = %e, "Failed to open terminal stream");
                return Err(e);
            }
            Err(_) => {
                crate::metrics::record_open_failure("unavailable");
                warn!(container_id = %target, "Timed out opening terminal stream");
                return Err(TerminalError::Unavailable(format!(
                    "timed out after {}s opening a shell in {}",
                    self.config.open_timeout_secs, target
                )));
            }
        };

        let session: SessionHandle = Arc::new(TerminalSession::new(
            stream.id,
            target.to_string(),
            routing_key,
            stream.writer,
        ));

        if let Err(e) = self.registry.register(session.clone()).await {
            error!(session_id = %session.id, "Runtime issued a duplicate session id");
            crate::metrics::record_open_failure(e.kind());
            if let Err(close_err) = self.bounded_close(&session).await {
                debug!(error = %close_err, "Closing rejected stream failed");
            }
            return Err(e);
        }

        self.transport
            .deliver(
                &routing_key,
                ServerEvent::Ready {
                    session_id: session.id.clone(),
                },
            )
            .await;

        OutputPump::new(
            session.clone(),
            stream.reader,
            self.transport.clone(),
            self.registry.clone(),
            self.config.poll_timeout(),
            self.config.close_grace(),
        )
        .spawn();

        crate::metrics::record_session_opened();
        info!(
            session_id = %session.id,
            container_id = %target,
            routing_key = %routing_key,
            "Terminal session opened"
        );

        Ok(session.id.clone())
    }

    pub async fn lookup(&self, id: &SessionId) -> Result<SessionHandle> {
        self.registry.lookup(id).await
    }

    /// Write client input to a session.
    ///
    /// Fails only when the session is unknown or no longer active. A failing
    /// write closes the session instead of being reported to the caller.
    pub async fn send_input(&self, id: &SessionId, bytes: &[u8]) -> Result<()> {
        let session = self.registry.lookup(id).await?;

        if !session.touch().await {
            return Err(TerminalError::SessionNotFound(id.clone()));
        }

        let written = tokio::time::timeout(self.config.close_grace(), session.write(bytes)).await;
        match written {
            Ok(Ok(())) => {
                crate::metrics::record_input_bytes(bytes.len() as u64);
            }
            Ok(Err(e)) => {
                warn!(session_id = %id, error = %e, "Terminal write failed, closing session");
                self.close_with_reason(id, CloseReason::StreamError).await;
            }
            Err(_) => {
                warn!(session_id = %id, "Terminal write timed out, closing session");
                self.close_with_reason(id, CloseReason::StreamError).await;
            }
        }

        Ok(())
    }

    /// Change a session's terminal size. Best effort: failures are only logged.
    pub async fn resize(&self, id: &SessionId, rows: u16, cols: u16) {
        if self.registry.lookup(id).await.is_err() {
            debug!(session_id = %id, "Resize for unknown terminal session ignored");
            return;
        }

        match self.provider.resize(id, rows, cols).await {
            Ok(()) => debug!(session_id = %id, rows, cols, "Terminal resized"),
            Err(e) => warn!(session_id = %id, error = %e, "Terminal resize failed"),
        }
    }

    /// Close a session at the client's request. Closing twice is a no-op.
    pub async fn close(&self, id: &SessionId) {
        self.close_with_reason(id, CloseReason::Requested).await;
    }

    /// Returns true if this call moved the session out of `Active`.
    pub async fn close_with_reason(&self, id: &SessionId, reason: CloseReason) -> bool {
        let Ok(session) = self.registry.lookup(id).await else {
            debug!(session_id = %id, "Close for unknown terminal session ignored");
            return false;
        };

        if !session.begin_close(reason).await {
            return false;
        }

        self.finish_close(&session, reason).await;
        true
    }

    /// Close `id` if it has had no input since `cutoff`.
    pub async fn expire_if_idle(&self, id: &SessionId, cutoff: DateTime<Utc>) -> bool {
        let Ok(session) = self.registry.lookup(id).await else {
            return false;
        };

        if !session.begin_close_if_idle(cutoff).await {
            return false;
        }

        self.finish_close(&session, CloseReason::Idle).await;
        true
    }

    /// Close every session routed to a client connection
    pub async fn close_connection(&self, routing_key: &RoutingKey) -> usize {
        let mut closed = 0;
        for session in self.registry.snapshot().await {
            if session.routing_key == *routing_key
                && self.close_with_reason(&session.id, CloseReason::Disconnected).await
            {
                closed += 1;
            }
        }
        closed
    }

    /// Close all sessions, used on shutdown
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let mut closed = 0;
        for session in self.registry.snapshot().await {
            if self.close_with_reason(&session.id, reason).await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn active_count(&self) -> usize {
        self.registry.len().await
    }

    /// Summaries of all registered sessions, oldest first
    pub async fn list(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let mut summaries = Vec::new();

        for session in self.registry.snapshot().await {
            let last_activity = session.last_activity().await;
            summaries.push(SessionSummary {
                session_id: session.id.clone(),
                container_id: session.target.clone(),
                state: session.state().await,
                created_at: session.created_at,
                last_activity,
                idle_seconds: (now - last_activity).num_seconds().max(0) as u64,
            });
        }

        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Second half of a close once the session is `Closing`: release the stream
    /// and unregister. The pump notices within one poll and notifies the client.
    async fn finish_close(&self, session: &SessionHandle, reason: CloseReason) {
        match self.bounded_close(session).await {
            Ok(()) => {}
            Err(e) => debug!(session_id = %session.id, error = %e, "Stream close failed"),
        }

        self.registry.remove(&session.id).await;
        info!(
            session_id = %session.id,
            container_id = %session.target,
            reason = reason.as_str(),
            "Terminal session closing"
        );
    }

    async fn bounded_close(&self, session: &SessionHandle) -> std::io::Result<()> {
        match tokio::time::timeout(self.config.close_grace(), session.close_stream()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session_id = %session.id, "Stream close exceeded grace period");
                Ok(())
            }
        }
    }
}

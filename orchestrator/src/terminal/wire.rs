//! Maps client events onto session manager calls

use tracing::{debug, warn};

use super::error::TerminalError;
use super::events::{ClientEvent, ServerEvent};
use super::manager::SessionManager;
use super::session::{RoutingKey, SessionId};
use super::transport::Transport;

/// Handle one event from the client connection behind `routing_key`.
///
/// Events from one connection must be handled one at a time, in arrival order.
pub async fn handle_client_event(
    manager: &SessionManager,
    transport: &dyn Transport,
    routing_key: RoutingKey,
    event: ClientEvent,
    prime_prompt: bool,
) {
    match event {
        ClientEvent::Init { container_id } => {
            let container_id = container_id.trim();
            if container_id.is_empty() {
                transport
                    .deliver(&routing_key, ServerEvent::error(None, "Missing container id"))
                    .await;
                return;
            }

            match manager.open(container_id, routing_key).await {
                Ok(session_id) => {
                    if prime_prompt {
                        if let Err(e) = manager.send_input(&session_id, b"\n").await {
                            debug!(session_id = %session_id, error = %e, "Prompt priming skipped");
                        }
                    }
                }
                Err(e) => {
                    transport
                        .deliver(&routing_key, ServerEvent::error(None, e.to_string()))
                        .await;
                }
            }
        }

        ClientEvent::Input { session_id, data } => {
            if let Err(e) = owned_by(manager, &session_id, routing_key).await {
                reject(transport, routing_key, session_id, e).await;
                return;
            }
            if let Err(e) = manager.send_input(&session_id, data.as_bytes()).await {
                reject(transport, routing_key, session_id, e).await;
            }
        }

        ClientEvent::Resize {
            session_id,
            rows,
            cols,
        } => {
            if rows == 0 || cols == 0 {
                transport
                    .deliver(
                        &routing_key,
                        ServerEvent::error(Some(session_id), "Terminal size must be non-zero"),
                    )
                    .await;
                return;
            }
            if owned_by(manager, &session_id, routing_key).await.is_err() {
                debug!(session_id = %session_id, "Resize for foreign or unknown session ignored");
                return;
            }
            manager.resize(&session_id, rows, cols).await;
        }

        ClientEvent::Close { session_id } => {
            if owned_by(manager, &session_id, routing_key).await.is_ok() {
                manager.close(&session_id).await;
            }
        }
    }
}

/// A connection may only drive its own sessions; others look unknown to it.
async fn owned_by(
    manager: &SessionManager,
    session_id: &SessionId,
    routing_key: RoutingKey,
) -> Result<(), TerminalError> {
    let session = manager.lookup(session_id).await?;
    if session.routing_key != routing_key {
        warn!(session_id = %session_id, "Client addressed a session it does not own");
        return Err(TerminalError::SessionNotFound(session_id.clone()));
    }
    Ok(())
}

async fn reject(
    transport: &dyn Transport,
    routing_key: RoutingKey,
    session_id: SessionId,
    err: TerminalError,
) {
    transport
        .deliver(&routing_key, ServerEvent::error(Some(session_id), err.to_string()))
        .await;
}

//! Interactive terminal WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::terminal::{wire, ClientEvent, CloseReason, RoutingKey, ServerEvent, Transport};
use crate::AppState;

/// Handle terminal WebSocket upgrade
pub async fn terminal_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_terminal_socket(socket, state))
}

/// Drive one client connection until it disconnects
async fn handle_terminal_socket(socket: WebSocket, state: Arc<AppState>) {
    let routing_key = RoutingKey::new();
    let mut outbound = state.hub.attach(routing_key).await;
    let (mut sender, mut receiver) = socket.split();

    info!(routing_key = %routing_key, "Terminal WebSocket connection established");

    // Everything addressed to this connection goes out through one task, in order
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to encode terminal event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    state.hub.deliver(&routing_key, ServerEvent::Connected).await;

    // Events are handled one at a time so input keeps its order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    wire::handle_client_event(
                        &state.sessions,
                        &*state.hub,
                        routing_key,
                        event,
                        state.config.terminal.prime_prompt,
                    )
                    .await;
                }
                Err(e) => {
                    debug!(error = %e, "Malformed terminal event");
                    state
                        .hub
                        .deliver(
                            &routing_key,
                            ServerEvent::error(None, format!("Invalid event: {}", e)),
                        )
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                info!(routing_key = %routing_key, "Terminal WebSocket connection closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Terminal WebSocket error");
                break;
            }
            _ => {}
        }
    }

    let closed = state.sessions.close_connection(&routing_key).await;
    if closed > 0 {
        info!(
            routing_key = %routing_key,
            sessions = closed,
            reason = CloseReason::Disconnected.as_str(),
            "Closed sessions of disconnected client"
        );
    }

    state.hub.detach(&routing_key).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    use crate::api::create_router;
    use crate::config::AppConfig;
    use crate::terminal::testing::{FakeContainer, FakeProvider};
    use crate::AppState;

    async fn serve() -> (SocketAddr, std::sync::Arc<AppState>) {
        let mut config = AppConfig::default();
        config.terminal.poll_timeout_ms = 20;
        let provider = FakeProvider::new()
            .with_container("web1", FakeContainer::Running)
            .with_echo_shell();
        let state = AppState::new(config, std::sync::Arc::new(provider));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn next_json<S>(socket: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("timed out waiting for event")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_terminal_round_trip_over_websocket() {
        let (addr, state) = serve().await;
        let (mut socket, _) = connect_async(format!("ws://{}/ws/terminal", addr))
            .await
            .unwrap();

        assert_eq!(next_json(&mut socket).await["type"], "connected");

        socket
            .send(WsMessage::Text(
                json!({"type": "init", "container_id": "web1"}).to_string(),
            ))
            .await
            .unwrap();

        let ready = next_json(&mut socket).await;
        assert_eq!(ready["type"], "ready");
        let session_id = ready["session_id"].as_str().unwrap().to_string();

        socket
            .send(WsMessage::Text(
                json!({"type": "input", "session_id": session_id, "data": "echo hi\n"})
                    .to_string(),
            ))
            .await
            .unwrap();

        let mut output = String::new();
        while !output.contains("hi\r\n") {
            let event = next_json(&mut socket).await;
            assert_eq!(event["type"], "output", "unexpected event {}", event);
            assert_eq!(event["session_id"], session_id.as_str());
            output.push_str(event["data"].as_str().unwrap());
        }

        socket
            .send(WsMessage::Text(
                json!({"type": "close", "session_id": session_id}).to_string(),
            ))
            .await
            .unwrap();

        loop {
            let event = next_json(&mut socket).await;
            if event["type"] == "closed" {
                assert_eq!(event["session_id"], session_id.as_str());
                assert_eq!(event["reason"], "requested");
                break;
            }
        }
        assert_eq!(state.sessions.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_sessions() {
        let (addr, state) = serve().await;
        let (mut socket, _) = connect_async(format!("ws://{}/ws/terminal", addr))
            .await
            .unwrap();
        next_json(&mut socket).await;

        socket
            .send(WsMessage::Text(
                json!({"type": "init", "container_id": "web1"}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(next_json(&mut socket).await["type"], "ready");
        assert_eq!(state.sessions.active_count().await, 1);

        drop(socket);

        let mut remaining = 1;
        for _ in 0..200 {
            remaining = state.sessions.active_count().await;
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_malformed_event_gets_error() {
        let (addr, _state) = serve().await;
        let (mut socket, _) = connect_async(format!("ws://{}/ws/terminal", addr))
            .await
            .unwrap();
        next_json(&mut socket).await;

        socket
            .send(WsMessage::Text("{\"type\":\"bogus\"}".to_string()))
            .await
            .unwrap();

        assert_eq!(next_json(&mut socket).await["type"], "error");
    }
}

//! Delivery of server events to client connections

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::events::ServerEvent;
use super::session::RoutingKey;

/// Carries events to exactly one addressed client connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `event` to the connection behind `routing_key`.
    ///
    /// Events for the same key arrive in the order they were delivered.
    async fn deliver(&self, routing_key: &RoutingKey, event: ServerEvent);
}

/// Per-connection outbound queues for live client connections
pub struct ConnectionHub {
    connections: RwLock<HashMap<RoutingKey, mpsc::Sender<ServerEvent>>>,
    buffer: usize,
}

impl ConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return the receiving end of its queue
    pub async fn attach(&self, routing_key: RoutingKey) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.write().await.insert(routing_key, tx);
        debug!(routing_key = %routing_key, "Client connection attached");
        rx
    }

    pub async fn detach(&self, routing_key: &RoutingKey) {
        if self.connections.write().await.remove(routing_key).is_some() {
            debug!(routing_key = %routing_key, "Client connection detached");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl Transport for ConnectionHub {
    async fn deliver(&self, routing_key: &RoutingKey, event: ServerEvent) {
        // Clone the sender so the map lock is not held while waiting on a full queue
        let sender = self.connections.read().await.get(routing_key).cloned();

        match sender {
            Some(sender) => {
                if sender.send(event).await.is_err() {
                    debug!(routing_key = %routing_key, "Client connection gone, event dropped");
                }
            }
            None => {
                debug!(routing_key = %routing_key, "No such client connection, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::session::SessionId;

    #[tokio::test]
    async fn test_delivers_in_order_to_addressed_connection() {
        let hub = ConnectionHub::new(8);
        let a = RoutingKey::new();
        let b = RoutingKey::new();
        let mut rx_a = hub.attach(a).await;
        let mut rx_b = hub.attach(b).await;

        for i in 0..3 {
            hub.deliver(
                &a,
                ServerEvent::Output {
                    session_id: SessionId::from("s"),
                    data: i.to_string(),
                },
            )
            .await;
        }

        for i in 0..3 {
            match rx_a.recv().await {
                Some(ServerEvent::Output { data, .. }) => assert_eq!(data, i.to_string()),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detached_connection_drops_events() {
        let hub = ConnectionHub::new(8);
        let key = RoutingKey::new();
        let mut rx = hub.attach(key).await;
        hub.detach(&key).await;

        hub.deliver(&key, ServerEvent::Connected).await;

        assert_eq!(hub.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}

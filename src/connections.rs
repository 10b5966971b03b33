//! Connection registry
//!
//! Tracks the live local WebSocket channel for each user. At most one
//! handle per user id; a new registration for the same id replaces (and
//! implicitly invalidates) the previous handle. Delivery goes through a
//! per-connection channel whose receiving end is owned by that
//! connection's forwarding task.

use crate::models::OutboundFrame;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Result of a targeted send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The frame was handed to the connection's channel
    Delivered,
    /// No live connection is registered for the user
    NotFound,
}

/// Send/close capability for one live local channel
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Wrap the sending end of a connection's outbound channel
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Queue a frame for delivery; fails when the connection task is gone
    pub fn send(&self, frame: OutboundFrame) -> Result<(), ()> {
        self.tx.send(frame).map_err(|_| ())
    }
}

/// Registry of live local connections, keyed by user id
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection for a user, replacing any existing handle
    ///
    /// The previous handle (if any) is dropped without notification; its
    /// forwarding task observes the closed channel and terminates.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let mut connections = self.connections.write().await;
        if connections.insert(user_id.to_string(), handle).is_some() {
            debug!(user_id = %user_id, "Replaced existing connection handle");
        }
        info!(
            user_id = %user_id,
            total_connections = connections.len(),
            "User connected"
        );
    }

    /// Remove a user's connection, if registered
    pub async fn unregister(&self, user_id: &str) {
        let mut connections = self.connections.write().await;
        if connections.remove(user_id).is_some() {
            info!(
                user_id = %user_id,
                total_connections = connections.len(),
                "User disconnected"
            );
        }
    }

    /// Send a frame to one user
    ///
    /// A send to an unregistered id is a no-op, not an error. A transport
    /// failure unregisters the dead handle.
    pub async fn send_to(&self, user_id: &str, frame: OutboundFrame) -> DeliveryStatus {
        let handle = {
            let connections = self.connections.read().await;
            connections.get(user_id).cloned()
        };

        let Some(handle) = handle else {
            return DeliveryStatus::NotFound;
        };

        if handle.send(frame).is_err() {
            warn!(user_id = %user_id, "Failed to send to connection, removing");
            self.unregister(user_id).await;
            return DeliveryStatus::NotFound;
        }
        DeliveryStatus::Delivered
    }

    /// Send a plain text message to one user, wrapped in a message frame
    pub async fn send_message(&self, user_id: &str, message: &str, agent: &str) -> DeliveryStatus {
        self.send_to(user_id, OutboundFrame::message(message, agent))
            .await
    }

    /// Send a frame to every registered connection
    ///
    /// A failure on one handle is logged and that handle is unregistered;
    /// delivery to the remaining handles continues. Returns the number of
    /// successful deliveries.
    pub async fn broadcast(&self, frame: OutboundFrame) -> usize {
        let snapshot: Vec<(String, ConnectionHandle)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, handle)| (id.clone(), handle.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (user_id, handle) in snapshot {
            if handle.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(user_id = %user_id, "Broadcast failed for connection, removing");
                dead.push(user_id);
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for user_id in dead {
                let _ = connections.remove(&user_id);
            }
        }

        delivered
    }

    /// Number of live connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    fn dead_handle() -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ConnectionHandle::new(tx)
    }

    #[tokio::test]
    async fn send_to_unregistered_is_not_found() {
        let registry = ConnectionRegistry::new();
        let status = registry
            .send_to("nobody", OutboundFrame::message("hi", "System"))
            .await;
        assert_eq!(status, DeliveryStatus::NotFound);
    }

    #[tokio::test]
    async fn send_to_delivers_frame() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = live_handle();
        registry.register("u1", handle).await;

        let status = registry.send_message("u1", "hello", "System").await;
        assert_eq!(status, DeliveryStatus::Delivered);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.message, "hello");
        assert_eq!(frame.agent, "System");
    }

    #[tokio::test]
    async fn register_replaces_previous_handle() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = live_handle();
        let (second, mut second_rx) = live_handle();

        registry.register("u1", first).await;
        registry.register("u1", second).await;
        assert_eq!(registry.count().await, 1);

        registry.send_message("u1", "after replace", "System").await;
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.recv().await.unwrap().message, "after replace");
    }

    #[tokio::test]
    async fn send_failure_unregisters_handle() {
        let registry = ConnectionRegistry::new();
        registry.register("u1", dead_handle()).await;

        let status = registry.send_message("u1", "hi", "System").await;
        assert_eq!(status, DeliveryStatus::NotFound);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_survives_one_failure_and_prunes_it() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = live_handle();
        let (b, mut b_rx) = live_handle();
        registry.register("a", a).await;
        registry.register("b", b).await;
        registry.register("dead", dead_handle()).await;

        let delivered = registry
            .broadcast(OutboundFrame::broadcast("news", "System"))
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(registry.count().await, 2);
        assert_eq!(a_rx.recv().await.unwrap().message, "news");
        assert_eq!(b_rx.recv().await.unwrap().message, "news");
    }
}

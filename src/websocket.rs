//! WebSocket handler for local user channels
//!
//! This module handles the `/ws/{user_id}` endpoint. Each connection gets
//! a forwarding task for outbound frames and a serial inbound loop: one
//! frame is processed to completion before the next is read, so a user's
//! history order always matches their send order.

use crate::models::InboundFrame;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Notice sent on connect
const WELCOME_MESSAGE: &str = "🤖 Welcome! I'm your multi-agent assistant. I have specialists in \
                               fitness (Helios 💪) and nutrition (Ceres 🥗). How can I help you today?";

/// WebSocket upgrade handler for `/ws/{user_id}`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

// Handle one WebSocket connection for its lifetime
async fn handle_socket(socket: WebSocket, user_id: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Outbound frames flow through a channel so the registry can deliver
    // without owning the socket.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    state
        .registry
        .register(&user_id, crate::connections::ConnectionHandle::new(tx))
        .await;

    let forward_user = user_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to serialize outbound frame");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json)).await {
                error!(user_id = %forward_user, error = %e, "Failed to send frame");
                break;
            }
        }
    });

    // Session exists from the first connect, before any message arrives.
    state.sessions.get_or_create(&user_id).await;

    state
        .registry
        .send_message(&user_id, WELCOME_MESSAGE, "System")
        .await;

    // Serial inbound loop: no pipelining within a connection.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(frame) => {
                    let content = frame.message.trim();
                    if content.is_empty() {
                        continue;
                    }
                    info!(user_id = %user_id, content = %content, "Received message");
                    state.orchestrator.handle_local(&user_id, content).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Invalid frame from client");
                    state
                        .registry
                        .send_message(&user_id, "Please send valid JSON messages.", "System")
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "WebSocket client disconnected");
                break;
            }
            Ok(_) => {
                // Ping/pong handled by axum; binary frames ignored.
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.registry.unregister(&user_id).await;
    send_task.abort();
    info!(user_id = %user_id, "WebSocket connection closed");
}

//! External WebSocket bridge
//!
//! Maintains the single outbound connection to a peer gateway. Inbound
//! frames are parsed with field fallbacks, filtered for loop prevention,
//! and fanned out to registered handlers with per-handler failure
//! isolation. Connection loss drives a bounded reconnect state machine:
//! attempts are incremented first, backoff is exponential with a cap, and
//! after the maximum number of attempts the bridge parks in the terminal
//! `Failed` state until `connect()` is called again.

use crate::config::BridgeConfig;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connectivity state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// No transport open and no reconnect in flight
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Transport open, listener running
    Connected,
    /// Waiting out the backoff before the next attempt
    Reconnecting,
    /// Reconnect attempts exhausted; terminal until a manual `connect()`
    Failed,
}

/// Read-only snapshot of the bridge state
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// Current state machine position
    pub status: BridgeState,
    /// Convenience flag, true only in `Connected`
    pub connected: bool,
    /// Configured peer URL template
    pub url: String,
    /// Identity announced to the peer
    pub peer_identity: String,
    /// Consecutive failed reconnect attempts
    pub reconnect_attempts: u32,
    /// Number of registered inbound handlers
    pub handler_count: usize,
}

/// Bridge-internal transport errors
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The handshake did not complete within the configured timeout
    #[error("Connection attempt timed out")]
    Timeout,

    /// WebSocket handshake or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Handler for inbound bridge traffic
///
/// Multiple handlers may be registered; they run in registration order and
/// a failure in one never prevents the remaining handlers from running.
#[async_trait]
pub trait BridgeHandler: Send + Sync {
    /// Process one inbound frame's extracted content
    async fn on_message(&self, content: &str, sender: &str, kind: &str) -> anyhow::Result<()>;
}

/// An inbound frame after field-fallback extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundBridgeMessage {
    /// Extracted message content
    pub content: String,
    /// Extracted sender identity
    pub sender: String,
    /// Extracted frame type
    pub kind: String,
}

struct StateInner {
    status: BridgeState,
    reconnect_attempts: u32,
}

/// Bridge to an external WebSocket peer
///
/// Exactly one instance exists per process; all methods take `&Arc<Self>`
/// where a background task may outlive the call.
pub struct ExternalBridge {
    config: BridgeConfig,
    sink: Mutex<Option<WsSink>>,
    state: RwLock<StateInner>,
    handlers: RwLock<Vec<Arc<dyn BridgeHandler>>>,
    /// Coalesces concurrent reconnect triggers into one loop
    reconnecting: AtomicBool,
    /// Connection generation; a stale listener must not clobber the state
    /// of a newer connection
    generation: AtomicU64,
}

impl ExternalBridge {
    /// Create a disconnected bridge
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            state: RwLock::new(StateInner {
                status: BridgeState::Disconnected,
                reconnect_attempts: 0,
            }),
            handlers: RwLock::new(Vec::new()),
            reconnecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Register an inbound-message handler
    pub async fn add_handler(&self, handler: Arc<dyn BridgeHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Connect to the external WebSocket peer
    ///
    /// On success the state moves to `Connected`, the attempt counter
    /// resets, a greeting frame is sent, and a background listener starts.
    /// On failure the state is `Disconnected` and `false` is returned; no
    /// automatic retry is started by a manual connect. This is also the
    /// manual escape hatch from the terminal `Failed` state.
    pub async fn connect(self: &Arc<Self>) -> bool {
        match self.establish().await {
            Ok(()) => {
                info!("Successfully connected to external WebSocket");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to external WebSocket");
                self.set_status(BridgeState::Disconnected).await;
                false
            }
        }
    }

    /// Send a message to the external peer
    ///
    /// Returns `false` immediately when not connected. A transport failure
    /// during the send marks the bridge disconnected and triggers the
    /// reconnect machine asynchronously.
    pub async fn send(self: &Arc<Self>, content: &str, agent_label: &str) -> bool {
        if self.state.read().await.status != BridgeState::Connected {
            warn!("Cannot send to external WebSocket: not connected");
            return false;
        }

        let frame = json!({
            "message": content,
            "agent": agent_label,
            "timestamp": Utc::now().to_rfc3339(),
            "from": self.config.identity,
            "type": "agent_response",
        });

        let mut sink = self.sink.lock().await;
        let result = match sink.as_mut() {
            Some(sink) => sink.send(WsMessage::Text(frame.to_string())).await,
            None => {
                warn!("Cannot send to external WebSocket: no open transport");
                return false;
            }
        };
        drop(sink);

        match result {
            Ok(()) => {
                info!(
                    agent = %agent_label,
                    content_len = content.len(),
                    "Sent to external WebSocket"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to send to external WebSocket");
                self.set_status(BridgeState::Disconnected).await;
                self.spawn_reconnect();
                false
            }
        }
    }

    /// Close the transport and stop the listener; idempotent
    pub async fn disconnect(&self) {
        // Invalidate the current listener so its exit does not trigger a
        // reconnect.
        let _ = self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.set_status(BridgeState::Disconnected).await;
        info!("Disconnected from external WebSocket");
    }

    /// Read-only snapshot of the bridge state
    pub async fn status(&self) -> BridgeStatus {
        let state = self.state.read().await;
        BridgeStatus {
            status: state.status,
            connected: state.status == BridgeState::Connected,
            url: self.config.url.clone(),
            peer_identity: self.config.identity.clone(),
            reconnect_attempts: state.reconnect_attempts,
            handler_count: self.handlers.read().await.len(),
        }
    }

    async fn set_status(&self, status: BridgeState) {
        self.state.write().await.status = status;
    }

    /// Open the transport, install the sink, start the listener, greet
    async fn establish(self: &Arc<Self>) -> Result<(), BridgeError> {
        let url = build_target_url(&self.config.url, &self.config.identity);
        info!(url = %url, "Connecting to external WebSocket");
        self.set_status(BridgeState::Connecting).await;

        let (ws, _response) = timeout(self.config.connect_timeout, connect_async(&url))
            .await
            .map_err(|_| BridgeError::Timeout)??;

        let (sink, source) = ws.split();
        *self.sink.lock().await = Some(sink);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().await;
            state.status = BridgeState::Connected;
            state.reconnect_attempts = 0;
        }

        let bridge = self.clone();
        tokio::spawn(async move {
            bridge.listen(source, generation).await;
        });

        // Initial greeting so the peer sees us come up.
        let _ = self
            .send("Hello! Gateway backend connected and ready.", "System")
            .await;

        Ok(())
    }

    /// Listener loop for one connection's lifetime
    async fn listen(self: Arc<Self>, mut source: WsSource, generation: u64) {
        loop {
            match source.next().await {
                Some(Ok(WsMessage::Text(raw))) => {
                    if let Some(inbound) = parse_inbound(&raw, &self.config.identity) {
                        self.dispatch(inbound).await;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("External WebSocket connection closed");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are handled by the protocol layer; binary
                    // frames are not part of the bridge contract.
                }
                Some(Err(e)) => {
                    error!(error = %e, "Error in external WebSocket listener");
                    break;
                }
            }
        }

        // Only the listener of the current connection may drive the state
        // machine; a replaced listener just exits.
        if self.generation.load(Ordering::SeqCst) == generation {
            self.sink.lock().await.take();
            self.set_status(BridgeState::Disconnected).await;
            self.spawn_reconnect();
        }
    }

    /// Fan an inbound message out to every registered handler
    async fn dispatch(&self, inbound: InboundBridgeMessage) {
        info!(
            sender = %inbound.sender,
            content = %inbound.content,
            "Processing external message"
        );

        let handlers: Vec<Arc<dyn BridgeHandler>> = self.handlers.read().await.clone();
        for handler in handlers {
            if let Err(e) = handler
                .on_message(&inbound.content, &inbound.sender, &inbound.kind)
                .await
            {
                error!(error = %e, "Error in bridge message handler");
            }
        }
    }

    /// Start the reconnect loop unless one is already in flight
    fn spawn_reconnect(self: &Arc<Self>) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconnect already in progress");
            return;
        }

        let bridge = self.clone();
        tokio::spawn(async move {
            bridge.reconnect_loop().await;
            bridge.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    /// Bounded reconnect state machine
    async fn reconnect_loop(self: &Arc<Self>) {
        loop {
            let attempts = {
                let mut state = self.state.write().await;
                if state.reconnect_attempts >= self.config.max_reconnect_attempts {
                    state.status = BridgeState::Failed;
                    error!(
                        attempts = state.reconnect_attempts,
                        "Max reconnection attempts reached for external WebSocket"
                    );
                    return;
                }
                state.reconnect_attempts += 1;
                state.status = BridgeState::Reconnecting;
                state.reconnect_attempts
            };

            let wait = backoff_delay(
                attempts,
                self.config.reconnect_base,
                self.config.reconnect_cap,
            );
            info!(
                attempt = attempts,
                max_attempts = self.config.max_reconnect_attempts,
                wait_ms = wait.as_millis() as u64,
                "Attempting external WebSocket reconnection"
            );
            tokio::time::sleep(wait).await;

            match self.establish().await {
                Ok(()) => {
                    info!("External WebSocket reconnected");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempts, "Reconnection attempt failed");
                }
            }
        }
    }
}

/// Build the peer URL from the configured template and identity
///
/// A `{user_id}` placeholder is substituted when present; otherwise the
/// identity is appended following the `/ws/` path convention.
pub fn build_target_url(template: &str, identity: &str) -> String {
    if template.contains("{user_id}") {
        template.replace("{user_id}", identity)
    } else if !template.ends_with("/ws") {
        format!("{}/ws/{}", template.trim_end_matches('/'), identity)
    } else {
        format!("{template}/{identity}")
    }
}

/// Exponential backoff with a cap: `min(base * 2^attempts, cap)`
pub fn backoff_delay(attempts: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempts.min(16));
    base.saturating_mul(factor).min(cap)
}

/// Parse a raw inbound frame into content/sender/kind
///
/// JSON objects use field fallbacks (`message`/`content`,
/// `sender`/`from`/`user`, `type`); non-JSON payloads become plain-text
/// content with a default sender. Returns `None` for frames that must be
/// dropped: empty content, non-object JSON, or our own traffic echoed back
/// (the self-identity check is an exact/substring match on the sender and
/// `from` fields and can false-positive on content that embeds the
/// identity string).
pub fn parse_inbound(raw: &str, self_identity: &str) -> Option<InboundBridgeMessage> {
    let (content, sender, kind) = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(data)) => {
            let content = data
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| data.get("content").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(data.clone()).to_string());
            let sender = data
                .get("sender")
                .and_then(Value::as_str)
                .or_else(|| data.get("from").and_then(Value::as_str))
                .or_else(|| data.get("user").and_then(Value::as_str))
                .unwrap_or("External User")
                .to_string();
            let kind = data
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("message")
                .to_string();

            // Loop prevention: skip our own messages.
            let from_field = data.get("from").and_then(Value::as_str).unwrap_or("");
            if sender == self_identity || from_field.contains(self_identity) {
                return None;
            }

            (content, sender, kind)
        }
        Ok(_) => {
            debug!("Dropping non-object JSON frame from external WebSocket");
            return None;
        }
        Err(_) => (
            raw.trim().to_string(),
            "External User".to_string(),
            "text".to_string(),
        ),
    };

    if content.trim().is_empty() {
        return None;
    }

    Some(InboundBridgeMessage {
        content,
        sender,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_with_placeholder_is_substituted() {
        assert_eq!(
            build_target_url("ws://peer:9000/ws/{user_id}", "backend"),
            "ws://peer:9000/ws/backend"
        );
    }

    #[test]
    fn url_without_placeholder_gets_ws_path() {
        assert_eq!(
            build_target_url("ws://peer:9000", "backend"),
            "ws://peer:9000/ws/backend"
        );
        assert_eq!(
            build_target_url("ws://peer:9000/", "backend"),
            "ws://peer:9000/ws/backend"
        );
    }

    #[test]
    fn url_ending_in_ws_gets_identity_segment() {
        assert_eq!(
            build_target_url("ws://peer:9000/ws", "backend"),
            "ws://peer:9000/ws/backend"
        );
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(4, base, cap), Duration::from_secs(16));
        assert_eq!(backoff_delay(5, base, cap), Duration::from_secs(30));
        assert_eq!(backoff_delay(12, base, cap), Duration::from_secs(30));
    }

    #[test]
    fn json_frame_uses_field_fallbacks() {
        let inbound =
            parse_inbound(r#"{"message":"hi","sender":"alice","type":"chat"}"#, "me").unwrap();
        assert_eq!(inbound.content, "hi");
        assert_eq!(inbound.sender, "alice");
        assert_eq!(inbound.kind, "chat");

        let inbound = parse_inbound(r#"{"content":"hi","from":"bob"}"#, "me").unwrap();
        assert_eq!(inbound.content, "hi");
        assert_eq!(inbound.sender, "bob");
        assert_eq!(inbound.kind, "message");

        let inbound = parse_inbound(r#"{"message":"hi","user":"carol"}"#, "me").unwrap();
        assert_eq!(inbound.sender, "carol");
    }

    #[test]
    fn plain_text_frame_becomes_content() {
        let inbound = parse_inbound("  just text  ", "me").unwrap();
        assert_eq!(inbound.content, "just text");
        assert_eq!(inbound.sender, "External User");
        assert_eq!(inbound.kind, "text");
    }

    #[test]
    fn missing_sender_defaults() {
        let inbound = parse_inbound(r#"{"message":"hi"}"#, "me").unwrap();
        assert_eq!(inbound.sender, "External User");
    }

    #[test]
    fn empty_or_whitespace_content_is_dropped() {
        assert!(parse_inbound(r#"{"message":"   "}"#, "me").is_none());
        assert!(parse_inbound("   ", "me").is_none());
        assert!(parse_inbound(r#"{"message":""}"#, "me").is_none());
    }

    #[test]
    fn own_identity_is_dropped() {
        assert!(parse_inbound(r#"{"message":"hi","sender":"gateway-backend"}"#, "gateway-backend").is_none());
        // Substring match on the from field.
        assert!(parse_inbound(
            r#"{"message":"hi","sender":"x","from":"relay/gateway-backend"}"#,
            "gateway-backend"
        )
        .is_none());
        // A different peer is kept.
        assert!(parse_inbound(r#"{"message":"hi","sender":"other"}"#, "gateway-backend").is_some());
    }

    #[test]
    fn non_object_json_is_dropped() {
        assert!(parse_inbound("5", "me").is_none());
        assert!(parse_inbound(r#""bare string""#, "me").is_none());
    }
}

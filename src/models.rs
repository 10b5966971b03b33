//! Core data models
//!
//! Defines the message, intent, and wire-frame structures shared by the
//! router, session store, orchestrator, and both WebSocket surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Message from a local user
    User,
    /// Message produced by a responder agent
    Agent,
    /// System notice (welcome, typing indicator, error notice)
    System,
    /// Message that arrived over the external bridge
    External,
}

impl MessageKind {
    /// Convert the kind to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Agent => "agent",
            MessageKind::System => "system",
            MessageKind::External => "external",
        }
    }
}

/// A single conversation message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Text content
    pub content: String,
    /// Identity of whoever produced the message
    pub sender: String,
    /// Kind of message
    pub kind: MessageKind,
    /// Arrival timestamp
    pub timestamp: DateTime<Utc>,
    /// Optional structured metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Create a new message with the current timestamp
    pub fn new(content: impl Into<String>, sender: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            sender: sender.into(),
            kind,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Message from a local user
    pub fn user(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::new(content, sender, MessageKind::User)
    }

    /// Message from a responder agent
    pub fn agent(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::new(content, sender, MessageKind::Agent)
    }

    /// Message that arrived via the external bridge
    pub fn external(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::new(content, sender, MessageKind::External)
    }
}

/// Routing decision produced by the router for a single message.
///
/// Produced fresh per routing call and never persisted. Confidence is
/// clamped to `[0.0, 1.0]` at construction, so downstream code can rely on
/// the invariant regardless of what a classifier returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIntent {
    /// Identifier of the responder that should handle the message
    pub agent: String,
    /// Confidence in the decision, always within [0.0, 1.0]
    pub confidence: f64,
    /// Human-readable rationale for the decision
    pub reasoning: String,
    /// Parameters extracted during routing (keyword counts, greeting flag)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_params: Option<Value>,
}

impl AgentIntent {
    /// Create an intent, clamping confidence into range
    pub fn new(
        agent: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
        extracted_params: Option<Value>,
    ) -> Self {
        Self {
            agent: agent.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            extracted_params,
        }
    }
}

/// Outbound frame sent to local WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Frame type ("message" or "broadcast")
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload
    pub message: String,
    /// Display label of the agent that produced the payload
    pub agent: String,
    /// ISO-8601 timestamp
    pub timestamp: String,
}

impl OutboundFrame {
    /// Direct message frame addressed to a single user
    pub fn message(message: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            message: message.into(),
            agent: agent.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Broadcast frame for all connected users
    pub fn broadcast(message: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            kind: "broadcast".to_string(),
            message: message.into(),
            agent: agent.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Inbound frame received from a local WebSocket client
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    /// The user's message text
    pub message: String,
}

/// Per-session summary exposed by the sessions API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Owning user id
    pub user_id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last saw activity
    pub last_activity: DateTime<Utc>,
    /// Number of messages in the conversation history
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_confidence_is_clamped() {
        let high = AgentIntent::new("helios", 1.7, "r", None);
        assert_eq!(high.confidence, 1.0);

        let low = AgentIntent::new("helios", -0.4, "r", None);
        assert_eq!(low.confidence, 0.0);

        let in_range = AgentIntent::new("helios", 0.85, "r", None);
        assert_eq!(in_range.confidence, 0.85);
    }

    #[test]
    fn outbound_frame_serializes_type_field() {
        let frame = OutboundFrame::message("hi", "System");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["agent"], "System");
    }
}

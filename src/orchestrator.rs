//! Pipeline orchestration
//!
//! One pipeline serves both traffic sources: local WebSocket users and the
//! external bridge. The orchestrator resolves the session, appends the
//! inbound message, routes it, invokes the responder, appends the reply,
//! and dispatches it back to the originating channel. Responder failures
//! are substituted with an apology exactly here, so no component below
//! needs its own user-facing fallback text.

use crate::agents::AgentSet;
use crate::bridge::{BridgeHandler, ExternalBridge};
use crate::connections::ConnectionRegistry;
use crate::models::{AgentIntent, Message, OutboundFrame};
use crate::router::MessageRouter;
use crate::services::files::FileService;
use crate::sessions::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Virtual user id owning the conversation state for bridge traffic
pub const EXTERNAL_USER_ID: &str = "external-socket-user";

/// Apology shown when a responder fails
const RESPONDER_APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// Drives the message pipeline for local and bridge traffic
pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    router: MessageRouter,
    agents: AgentSet,
    registry: Arc<ConnectionRegistry>,
    files: Arc<FileService>,
    /// Set after construction when a bridge is configured
    bridge: RwLock<Option<Arc<ExternalBridge>>>,
}

impl Orchestrator {
    /// Compose the pipeline from its collaborators
    pub fn new(
        sessions: Arc<SessionStore>,
        router: MessageRouter,
        agents: AgentSet,
        registry: Arc<ConnectionRegistry>,
        files: Arc<FileService>,
    ) -> Self {
        Self {
            sessions,
            router,
            agents,
            registry,
            files,
            bridge: RwLock::new(None),
        }
    }

    /// Wire up the external bridge for outbound delivery
    pub async fn attach_bridge(&self, bridge: Arc<ExternalBridge>) {
        *self.bridge.write().await = Some(bridge);
    }

    /// (id, domain) pairs for the health endpoint
    pub fn agent_domains(&self) -> Vec<(String, String)> {
        self.agents.domains()
    }

    /// The responder catalog identifiers
    pub fn agent_catalog(&self) -> Vec<String> {
        self.agents.catalog()
    }

    /// Route a message against the session's full history
    async fn route(&self, user_id: &str, content: &str) -> AgentIntent {
        let history = self.sessions.history(user_id).await;
        let intent = self.router.route(content, &history).await;
        info!(
            user_id = %user_id,
            agent = %intent.agent,
            confidence = intent.confidence,
            "Routing message"
        );
        intent
    }

    /// Invoke the routed responder, substituting the apology on failure
    ///
    /// Returns the resolved agent id, its display name, and the reply text.
    async fn execute(&self, user_id: &str, content: &str, intent: &AgentIntent) -> (String, String, String) {
        let history = self.sessions.history(user_id).await;
        let responder = self.agents.resolve(&intent.agent);
        let reply = match responder.respond(user_id, content, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    user_id = %user_id,
                    agent = %responder.id(),
                    error = %e,
                    "Responder failed, substituting apology"
                );
                RESPONDER_APOLOGY.to_string()
            }
        };

        self.sessions.set_active_agent(user_id, responder.id()).await;
        (
            responder.id().to_string(),
            responder.display_name().to_string(),
            reply,
        )
    }

    /// Handle one inbound frame from a local user's connection
    ///
    /// Processing is serial per connection: the caller awaits completion
    /// before reading the next frame, which keeps append order equal to
    /// processing order within a session.
    pub async fn handle_local(&self, user_id: &str, content: &str) {
        self.sessions.get_or_create(user_id).await;
        self.sessions
            .append(user_id, Message::user(content, user_id))
            .await;

        let intent = self.route(user_id, content).await;

        // Typing indicator while the responder works.
        self.registry
            .send_message(
                user_id,
                &format!("{} is thinking...", title_case(&intent.agent)),
                "System",
            )
            .await;

        let (agent_id, display_name, reply) = self.execute(user_id, content, &intent).await;

        self.sessions
            .append(user_id, Message::agent(reply.clone(), agent_id))
            .await;

        self.registry
            .send_to(user_id, OutboundFrame::message(&reply, &display_name))
            .await;

        if let Err(e) = self
            .files
            .log_to_file(
                user_id,
                "conversations.md",
                &format!("User: {content}\n{display_name}: {reply}"),
            )
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to log conversation");
        }
    }
}

#[async_trait]
impl BridgeHandler for Orchestrator {
    /// Handle one inbound frame from the external bridge
    ///
    /// Bridge traffic shares one virtual session. The reply goes back out
    /// over the bridge, and local observers get a short broadcast notice.
    async fn on_message(&self, content: &str, sender: &str, _kind: &str) -> anyhow::Result<()> {
        self.sessions.get_or_create(EXTERNAL_USER_ID).await;
        self.sessions
            .append(EXTERNAL_USER_ID, Message::external(content, sender))
            .await;

        let intent = self.route(EXTERNAL_USER_ID, content).await;
        let (agent_id, display_name, reply) =
            self.execute(EXTERNAL_USER_ID, content, &intent).await;

        self.sessions
            .append(EXTERNAL_USER_ID, Message::agent(reply.clone(), &agent_id))
            .await;

        let bridge = self.bridge.read().await.clone();
        match bridge {
            Some(bridge) => {
                let _ = bridge.send(&reply, &display_name).await;
            }
            None => warn!("External message processed but no bridge is attached"),
        }

        self.registry
            .broadcast(OutboundFrame::broadcast(
                format!("External conversation: {sender} asked about {agent_id} domain"),
                "External Monitor",
            ))
            .await;

        if let Err(e) = self
            .files
            .log_to_file(
                EXTERNAL_USER_ID,
                "external_conversations.md",
                &format!("[{sender}]: {content}\n[{display_name}]: {reply}"),
            )
            .await
        {
            warn!(error = %e, "Failed to log external conversation");
        }

        Ok(())
    }
}

/// Capitalize the first character of an agent id for user-facing notices
fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

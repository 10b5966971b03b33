//! Integration tests for the message pipeline
//!
//! These tests drive the orchestrator end to end with stub classifier and
//! responders, and verify:
//! 1. Local flow: session append, typing indicator, reply delivery, logging
//! 2. Responder failure substitution with the apology text
//! 3. Unknown routed agent ids resolving to the general responder
//! 4. Bridge flow: the shared virtual session and the observer broadcast

use agent_gateway_backend::agents::{AgentSet, Responder};
use agent_gateway_backend::bridge::BridgeHandler;
use agent_gateway_backend::connections::{ConnectionHandle, ConnectionRegistry};
use agent_gateway_backend::llm::{IntentClassifier, LlmError};
use agent_gateway_backend::models::{AgentIntent, Message, MessageKind, OutboundFrame};
use agent_gateway_backend::orchestrator::{Orchestrator, EXTERNAL_USER_ID};
use agent_gateway_backend::router::MessageRouter;
use agent_gateway_backend::services::files::FileService;
use agent_gateway_backend::sessions::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

const APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// Classifier stub that always routes to a fixed agent id
struct StubClassifier {
    agent: &'static str,
}

#[async_trait]
impl IntentClassifier for StubClassifier {
    async fn classify(
        &self,
        _message: &str,
        _recent_history: &[Message],
        _available_agents: &[String],
    ) -> Result<AgentIntent, LlmError> {
        Ok(AgentIntent::new(self.agent, 0.7, "stub verdict", None))
    }
}

/// Responder stub with a canned reply or a canned failure
struct StubResponder {
    id: &'static str,
    display: &'static str,
    fail: bool,
}

#[async_trait]
impl Responder for StubResponder {
    fn id(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> &str {
        self.display
    }

    fn domain(&self) -> &str {
        "stub domain"
    }

    async fn respond(
        &self,
        _user_id: &str,
        message: &str,
        _history: &[Message],
    ) -> Result<String, LlmError> {
        if self.fail {
            Err(LlmError::EmptyResponse)
        } else {
            Ok(format!("reply to: {message}"))
        }
    }
}

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionStore>,
    data_dir: TempDir,
}

fn build_fixture(classifier_agent: &'static str, general_fails: bool) -> Fixture {
    let data_dir = tempfile::tempdir().unwrap();
    let files = Arc::new(FileService::new(data_dir.path()).unwrap());
    let sessions = Arc::new(SessionStore::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let router = MessageRouter::new(Arc::new(StubClassifier {
        agent: classifier_agent,
    }));
    let agents = AgentSet::new(vec![Arc::new(StubResponder {
        id: "general",
        display: "General Bot",
        fail: general_fails,
    })]);

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        router,
        agents,
        registry.clone(),
        files,
    ));

    Fixture {
        orchestrator,
        registry,
        sessions,
        data_dir,
    }
}

async fn register_connection(
    registry: &ConnectionRegistry,
    user_id: &str,
) -> mpsc::UnboundedReceiver<OutboundFrame> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.register(user_id, ConnectionHandle::new(tx)).await;
    rx
}

#[tokio::test]
async fn local_message_flows_through_session_routing_and_delivery() {
    let fixture = build_fixture("general", false);
    let mut rx = register_connection(&fixture.registry, "u1").await;

    // "hello there" hits the greeting keywords, so routing is deterministic.
    fixture.orchestrator.handle_local("u1", "hello there").await;

    let thinking = rx.recv().await.unwrap();
    assert_eq!(thinking.kind, "message");
    assert_eq!(thinking.agent, "System");
    assert_eq!(thinking.message, "General is thinking...");

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.kind, "message");
    assert_eq!(reply.agent, "General Bot");
    assert_eq!(reply.message, "reply to: hello there");

    let history = fixture.sessions.history("u1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, MessageKind::User);
    assert_eq!(history[0].content, "hello there");
    assert_eq!(history[1].kind, MessageKind::Agent);
    assert_eq!(history[1].content, "reply to: hello there");

    let log_path = fixture.data_dir.path().join("u1").join("conversations.md");
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("User: hello there"));
    assert!(log.contains("General Bot: reply to: hello there"));
}

#[tokio::test]
async fn responder_failure_is_replaced_with_apology() {
    let fixture = build_fixture("general", true);
    let mut rx = register_connection(&fixture.registry, "u1").await;

    fixture.orchestrator.handle_local("u1", "hello there").await;

    let _thinking = rx.recv().await.unwrap();
    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.message, APOLOGY);
    assert_eq!(reply.agent, "General Bot");

    // The apology is recorded in the history like any other reply.
    let history = fixture.sessions.history("u1").await;
    assert_eq!(history[1].content, APOLOGY);
}

#[tokio::test]
async fn unknown_routed_agent_falls_back_to_general() {
    // The classifier names an agent that is not in the catalog; the
    // unroutable text forces the classifier path.
    let fixture = build_fixture("mystery", false);
    let mut rx = register_connection(&fixture.registry, "u1").await;

    fixture
        .orchestrator
        .handle_local("u1", "what is the capital of France?")
        .await;

    let thinking = rx.recv().await.unwrap();
    assert_eq!(thinking.message, "Mystery is thinking...");

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.agent, "General Bot");
}

#[tokio::test]
async fn bridge_message_uses_virtual_session_and_notifies_observers() {
    let fixture = build_fixture("general", false);
    let mut observer = register_connection(&fixture.registry, "observer").await;

    fixture
        .orchestrator
        .on_message("hello there", "peer-gateway", "message")
        .await
        .unwrap();

    let notice = observer.recv().await.unwrap();
    assert_eq!(notice.kind, "broadcast");
    assert_eq!(notice.agent, "External Monitor");
    assert_eq!(
        notice.message,
        "External conversation: peer-gateway asked about general domain"
    );

    let history = fixture.sessions.history(EXTERNAL_USER_ID).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, MessageKind::External);
    assert_eq!(history[0].sender, "peer-gateway");
    assert_eq!(history[1].kind, MessageKind::Agent);

    let log_path = fixture
        .data_dir
        .path()
        .join(EXTERNAL_USER_ID)
        .join("external_conversations.md");
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("[peer-gateway]: hello there"));
}

//! Responder agents
//!
//! The `Responder` trait is the capability boundary for turning a routed
//! message plus history into reply text. The three concrete responders are
//! LLM-backed chat agents with different system prompts: helios (fitness),
//! ceres (nutrition), and general.

use crate::llm::{LlmError, LlmService};
use crate::models::Message;
use crate::services::files::FileService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Number of trailing history entries included in the prompt context
const CONTEXT_WINDOW: usize = 10;

/// Responder identifier of the general assistant (routing fallback)
pub const GENERAL_AGENT: &str = "general";

/// Capability that produces reply text for a routed message
#[async_trait]
pub trait Responder: Send + Sync {
    /// Stable identifier used by the router
    fn id(&self) -> &str;

    /// Label shown to users next to the reply
    fn display_name(&self) -> &str;

    /// One-line description of the responder's domain
    fn domain(&self) -> &str;

    /// Produce reply text for a message in the context of a conversation
    async fn respond(
        &self,
        user_id: &str,
        message: &str,
        history: &[Message],
    ) -> Result<String, LlmError>;
}

/// An LLM-backed chat agent with a fixed persona prompt
pub struct ChatAgent {
    id: String,
    display_name: String,
    domain: String,
    system_prompt: String,
    llm: Arc<LlmService>,
    files: Arc<FileService>,
}

impl ChatAgent {
    /// Create an agent with an arbitrary persona
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        domain: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<LlmService>,
        files: Arc<FileService>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            domain: domain.into(),
            system_prompt: system_prompt.into(),
            llm,
            files,
        }
    }

    /// The fitness and exercise agent
    pub fn helios(llm: Arc<LlmService>, files: Arc<FileService>) -> Self {
        let prompt = "You are Helios 💪, a fitness and exercise expert agent. You help users with \
                      workout planning and routines, exercise recommendations, fitness goal setting \
                      and tracking, strength training advice, cardio optimization, recovery and \
                      flexibility, and progress monitoring.\n\n\
                      Your personality: energetic and motivating, evidence-based, adaptable to all \
                      fitness levels, safety-first. Use fitness emojis: 💪, 🏋️, 🏃, 🔥, 📈.\n\n\
                      Always ask about current fitness level, any injuries, and specific goals \
                      before giving detailed advice. Keep responses practical and actionable.";
        Self::new(
            "helios",
            "Helios 💪",
            "fitness & exercise",
            prompt,
            llm,
            files,
        )
    }

    /// The nutrition and food agent
    pub fn ceres(llm: Arc<LlmService>, files: Arc<FileService>) -> Self {
        let prompt = "You are Ceres 🥗, a nutrition and food expert agent. You help users with \
                      meal planning and recipes, nutritional advice and education, dietary \
                      recommendations, nutrition tracking, allergy and dietary restriction \
                      management, cooking tips, and health goal-based nutrition.\n\n\
                      Your personality: warm and nurturing, science-based, inclusive of all dietary \
                      preferences, practical and budget-conscious. Use food emojis: 🥗, 🍎, 🥘, 🌱, 📊.\n\n\
                      Always ask about dietary restrictions, allergies, and health goals before \
                      making recommendations. Provide balanced, sustainable nutrition advice.";
        Self::new("ceres", "Ceres 🥗", "nutrition & food", prompt, llm, files)
    }

    /// The general-purpose assistant
    pub fn general(llm: Arc<LlmService>, files: Arc<FileService>) -> Self {
        let prompt = "You are a General Assistant 🤖, a helpful and friendly AI agent. You help \
                      with general conversation and questions, information and explanations, \
                      greetings and social interaction, and routing to specialized agents when \
                      needed.\n\n\
                      Your personality: friendly, approachable, helpful, good at understanding \
                      context, proactive in suggesting better agents for specific tasks. Use \
                      general emojis: 🤖, 💬, 📚, 🤝, ✨.\n\n\
                      When users ask about fitness, direct them to Helios 💪. When users ask about \
                      nutrition, direct them to Ceres 🥗.";
        Self::new(
            GENERAL_AGENT,
            "Assistant 🤖",
            "general assistance",
            prompt,
            llm,
            files,
        )
    }

    /// Build prompt context from the trailing history window
    fn build_context(history: &[Message]) -> String {
        if history.is_empty() {
            return "No previous conversation.".to_string();
        }
        let start = history.len().saturating_sub(CONTEXT_WINDOW);
        history[start..]
            .iter()
            .map(|msg| format!("{}: {}", msg.sender, msg.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Responder for ChatAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn respond(
        &self,
        user_id: &str,
        message: &str,
        history: &[Message],
    ) -> Result<String, LlmError> {
        let context = Self::build_context(history);
        let response = self
            .llm
            .get_completion(
                Some(&self.system_prompt),
                &format!("Context: {context}\n\nUser message: {message}"),
                0.7,
                1000,
            )
            .await?;

        // Interaction log is best-effort; a storage failure never blocks
        // the reply.
        if let Err(e) = self
            .files
            .log_to_file(
                user_id,
                &format!("{}_interactions.md", self.id),
                &format!("User: {message}\n{}: {response}", self.display_name),
            )
            .await
        {
            warn!(agent = %self.id, error = %e, "Failed to log agent interaction");
        }

        Ok(response)
    }
}

/// The full catalog of responders known to the gateway
pub struct AgentSet {
    responders: Vec<Arc<dyn Responder>>,
}

impl AgentSet {
    /// Build a set from arbitrary responders; must contain `general`
    pub fn new(responders: Vec<Arc<dyn Responder>>) -> Self {
        debug_assert!(responders.iter().any(|r| r.id() == GENERAL_AGENT));
        Self { responders }
    }

    /// The standard helios/ceres/general catalog
    pub fn standard(llm: Arc<LlmService>, files: Arc<FileService>) -> Self {
        Self::new(vec![
            Arc::new(ChatAgent::helios(llm.clone(), files.clone())),
            Arc::new(ChatAgent::ceres(llm.clone(), files.clone())),
            Arc::new(ChatAgent::general(llm, files)),
        ])
    }

    /// Resolve a routed agent id, falling back to the general assistant
    pub fn resolve(&self, agent_id: &str) -> &Arc<dyn Responder> {
        self.responders
            .iter()
            .find(|r| r.id() == agent_id)
            .unwrap_or_else(|| {
                self.responders
                    .iter()
                    .find(|r| r.id() == GENERAL_AGENT)
                    .expect("agent set always contains the general responder")
            })
    }

    /// All responder identifiers
    pub fn catalog(&self) -> Vec<String> {
        self.responders.iter().map(|r| r.id().to_string()).collect()
    }

    /// (id, domain) pairs for the health endpoint
    pub fn domains(&self) -> Vec<(String, String)> {
        self.responders
            .iter()
            .map(|r| (r.id().to_string(), r.domain().to_string()))
            .collect()
    }
}

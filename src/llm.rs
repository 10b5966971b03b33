//! LLM provider client
//!
//! Direct HTTP client for an OpenAI-compatible chat-completions API. This is
//! the backend for both the classifier fallback in the router and the
//! responder agents. The client is shared (connection pooling) and supports
//! a custom base URL for testing.

use crate::config::LlmConfig;
use crate::models::{AgentIntent, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the LLM provider boundary
///
/// These never propagate past the router (default intent) or the
/// orchestrator (apology substitution); see the error handling design.
#[derive(Error, Debug)]
pub enum LlmError {
    /// HTTP transport failure
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider returned a non-success status
    #[error("LLM API returned status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body returned by the provider
        body: String,
    },

    /// Provider response could not be parsed
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Provider returned no completion choices
    #[error("LLM response contained no choices")]
    EmptyResponse,
}

/// Capability that maps a message plus bounded history to a routing intent.
///
/// The router calls this only when its quick keyword pass finds no match.
/// Implementations report failures through `LlmError`; the router is the
/// single place that absorbs them into a default intent.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a message against the responder catalog
    async fn classify(
        &self,
        message: &str,
        recent_history: &[Message],
        available_agents: &[String],
    ) -> Result<AgentIntent, LlmError>;
}

// Chat-completions wire types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// What the classifier is asked to return. Every field is optional so a
/// partially well-formed reply still routes with default values.
#[derive(Deserialize)]
struct ClassifierVerdict {
    agent: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    extracted_params: Option<serde_json::Value>,
}

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct LlmService {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmService {
    /// Create a service from configuration
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Override the base URL (used by tests against a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Get a completion for a single user turn with an optional system prompt
    ///
    /// # Arguments
    /// * `system_prompt` - Optional system instructions
    /// * `user_content` - The user turn content
    /// * `temperature` - Sampling temperature
    /// * `max_tokens` - Completion length bound
    ///
    /// # Returns
    /// * `Ok(String)` - The completion text, trimmed
    /// * `Err(LlmError)` - Transport, API, or parse failure
    pub async fn get_completion(
        &self,
        system_prompt: Option<&str>,
        user_content: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_content,
        });

        let request_body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(
            url = %url,
            model = %self.config.model,
            prompt_len = user_content.len(),
            "Calling LLM API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());

            tracing::error!(
                status_code = status.as_u16(),
                error_body = %body,
                "LLM API returned error status"
            );

            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }

    /// Build the classification prompt from the bounded history and catalog
    fn classification_prompt(recent_history: &[Message], available_agents: &[String]) -> String {
        let mut history_context = String::new();
        for msg in recent_history {
            history_context.push_str(&format!("{}: {}\n", msg.sender, msg.content));
        }

        format!(
            "You are a message router for a multi-agent system. Analyze the user's \
             message and determine which agent should handle it.\n\n\
             Available agents:\n\
             - helios: Handles fitness, workouts, exercise, training, gym activities, physical health, sports\n\
             - ceres: Handles nutrition, food, meals, diet, recipes, cooking, eating habits, dietary advice\n\
             - general: For greetings, general questions, chitchat, or unclear requests\n\n\
             Agent catalog: {}\n\n\
             Recent conversation context:\n{}\n\
             Respond with a JSON object containing:\n\
             {{\"agent\": \"agent_name\", \"confidence\": 0.8, \"reasoning\": \"why\", \"extracted_params\": {{}}}}\n\n\
             Rules:\n\
             - Route fitness/exercise/workout questions to helios\n\
             - Route food/nutrition/diet questions to ceres\n\
             - Route greetings and general chat to general\n\
             - If uncertain, use general with lower confidence\n\
             - Confidence should be 0.0-1.0",
            available_agents.join(", "),
            history_context
        )
    }
}

#[async_trait]
impl IntentClassifier for LlmService {
    async fn classify(
        &self,
        message: &str,
        recent_history: &[Message],
        available_agents: &[String],
    ) -> Result<AgentIntent, LlmError> {
        let prompt = Self::classification_prompt(recent_history, available_agents);
        let response = self
            .get_completion(Some(&prompt), message, 0.3, 200)
            .await?;

        let verdict: ClassifierVerdict = serde_json::from_str(&response)
            .map_err(|e| LlmError::MalformedResponse(format!("{e} - body: {response}")))?;

        // AgentIntent::new clamps confidence into [0, 1] whatever the
        // classifier claimed.
        Ok(AgentIntent::new(
            verdict.agent.unwrap_or_else(|| "general".to_string()),
            verdict.confidence.unwrap_or(0.5),
            verdict
                .reasoning
                .unwrap_or_else(|| "Default routing".to_string()),
            verdict.extracted_params,
        ))
    }
}

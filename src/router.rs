//! Message routing
//!
//! Routes messages to the appropriate responder based on content analysis.
//! A deterministic keyword pass runs first; only when it finds nothing does
//! the router delegate to the LLM classifier. Classifier failures are
//! absorbed here into a low-confidence default intent, so `route` never
//! fails.

use crate::llm::IntentClassifier;
use crate::models::{AgentIntent, Message};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Number of trailing history entries handed to the classifier
const CLASSIFIER_HISTORY_WINDOW: usize = 5;

/// Fitness-domain keywords (routed to helios)
const FITNESS_KEYWORDS: &[&str] = &[
    "workout",
    "exercise",
    "gym",
    "fitness",
    "training",
    "run",
    "lift",
    "cardio",
    "strength",
    "muscle",
    "pushup",
    "squat",
    "deadlift",
    "marathon",
    "sprint",
    "yoga",
    "pilates",
    "crossfit",
    "weightlifting",
];

/// Nutrition-domain keywords (routed to ceres)
const NUTRITION_KEYWORDS: &[&str] = &[
    "food",
    "eat",
    "meal",
    "diet",
    "nutrition",
    "recipe",
    "cook",
    "calories",
    "protein",
    "carbs",
    "fat",
    "vitamins",
    "hungry",
    "breakfast",
    "lunch",
    "dinner",
    "snack",
    "vegetarian",
    "vegan",
    "keto",
    "weight loss",
];

/// Greeting keywords (routed to general)
const GREETING_KEYWORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "what's up",
    "greetings",
    "yo",
];

/// Routes messages to appropriate agents based on content analysis
pub struct MessageRouter {
    classifier: Arc<dyn IntentClassifier>,
    available_agents: Vec<String>,
}

impl MessageRouter {
    /// Create a router backed by the given classifier
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self {
            classifier,
            available_agents: vec![
                "helios".to_string(),
                "ceres".to_string(),
                "general".to_string(),
            ],
        }
    }

    /// The catalog of responder identifiers this router knows about
    pub fn available_agents(&self) -> &[String] {
        &self.available_agents
    }

    /// Analyze a message and determine which agent should handle it
    ///
    /// Never fails: a classifier error is converted into a default
    /// low-confidence "general" intent.
    pub async fn route(&self, message: &str, history: &[Message]) -> AgentIntent {
        // Quick keyword-based routing for efficiency
        if let Some(intent) = quick_route(message) {
            info!(
                agent = %intent.agent,
                confidence = intent.confidence,
                "Quick route successful"
            );
            return intent;
        }

        // Use the LLM for complex routing, with a bounded history window
        info!("Using LLM classification for routing");
        let window_start = history.len().saturating_sub(CLASSIFIER_HISTORY_WINDOW);
        match self
            .classifier
            .classify(message, &history[window_start..], &self.available_agents)
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Intent classification failed, using default routing");
                AgentIntent::new(
                    "general",
                    0.3,
                    format!("Error in classification: {e}"),
                    None,
                )
            }
        }
    }
}

/// Fast keyword-based routing for common patterns
///
/// Categories are checked in fixed order: fitness, nutrition, greeting. The
/// first category with at least one case-insensitive substring match wins.
/// Returns `None` when nothing matches, which triggers LLM classification.
pub fn quick_route(message: &str) -> Option<AgentIntent> {
    let message_lower = message.to_lowercase();
    let count = |keywords: &[&str]| {
        keywords
            .iter()
            .filter(|keyword| message_lower.contains(*keyword))
            .count()
    };

    let fitness_score = count(FITNESS_KEYWORDS);
    if fitness_score >= 1 {
        return Some(AgentIntent::new(
            "helios",
            0.8 + (fitness_score as f64 * 0.1).min(0.2),
            format!("Found {fitness_score} fitness-related keywords"),
            Some(json!({ "keywords_found": fitness_score })),
        ));
    }

    let nutrition_score = count(NUTRITION_KEYWORDS);
    if nutrition_score >= 1 {
        return Some(AgentIntent::new(
            "ceres",
            0.8 + (nutrition_score as f64 * 0.1).min(0.2),
            format!("Found {nutrition_score} nutrition-related keywords"),
            Some(json!({ "keywords_found": nutrition_score })),
        ));
    }

    let greeting_score = count(GREETING_KEYWORDS);
    if greeting_score >= 1 {
        return Some(AgentIntent::new(
            "general",
            0.9,
            "Greeting or general conversation",
            Some(json!({ "greeting": true })),
        ));
    }

    None
}

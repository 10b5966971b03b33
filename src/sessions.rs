//! Session store
//!
//! Owns per-user conversation state. One session per user id, created
//! lazily on first use and kept for the process lifetime (no eviction).
//! Mutation of a given session is serialized through that session's own
//! lock, so append order always equals processing order for a user
//! regardless of which task is driving the pipeline.

use crate::models::{Message, SessionSummary};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Per-user conversation state
#[derive(Debug, Clone)]
pub struct UserSession {
    /// Owning user id
    pub user_id: String,
    /// Append-only message history in arrival order
    pub conversation_history: Vec<Message>,
    /// Responder that last handled a message for this user
    pub active_agent: Option<String>,
    /// Free-form per-session data
    pub session_data: HashMap<String, Value>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last saw activity
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    /// Create an empty session for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            conversation_history: Vec::new(),
            active_agent: None,
            session_data: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Store of all live sessions, keyed by user id
///
/// The outer map is guarded by an `RwLock`; each session carries its own
/// `Mutex` so writers to different users never contend.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<UserSession>>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the session for a user, creating it on first use
    pub async fn get_or_create(&self, user_id: &str) -> Arc<Mutex<UserSession>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(user_id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        // A concurrent caller may have created it between the locks.
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id = %user_id, "Creating new session");
                Arc::new(Mutex::new(UserSession::new(user_id)))
            })
            .clone()
    }

    /// Append a message to an existing session and bump its activity time
    ///
    /// Returns `false` when no session exists for the user; the caller is
    /// expected to have called `get_or_create` first.
    pub async fn append(&self, user_id: &str, message: Message) -> bool {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };

        match handle {
            Some(session) => {
                let mut session = session.lock().await;
                session.conversation_history.push(message);
                session.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Record which responder last handled a message for a user
    pub async fn set_active_agent(&self, user_id: &str, agent: &str) {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };
        if let Some(session) = handle {
            session.lock().await.active_agent = Some(agent.to_string());
        }
    }

    /// A clone of the full conversation history for a user, in arrival order
    pub async fn history(&self, user_id: &str) -> Vec<Message> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };
        match handle {
            Some(session) => session.lock().await.conversation_history.clone(),
            None => Vec::new(),
        }
    }

    /// The last `n` messages for a user, in arrival order
    ///
    /// Returns fewer when the history is shorter, and an empty vec when no
    /// session exists.
    pub async fn recent_window(&self, user_id: &str, n: usize) -> Vec<Message> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };
        match handle {
            Some(session) => {
                let session = session.lock().await;
                let start = session.conversation_history.len().saturating_sub(n);
                session.conversation_history[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Per-session summaries for the sessions API
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let handles: Vec<Arc<Mutex<UserSession>>> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = handle.lock().await;
            summaries.push(SessionSummary {
                user_id: session.user_id.clone(),
                created_at: session.created_at,
                last_activity: session.last_activity,
                message_count: session.conversation_history.len(),
            });
        }
        summaries
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

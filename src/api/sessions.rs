//! Session inspection endpoint

use crate::models::SessionSummary;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Response for the sessions listing
#[derive(Serialize)]
pub struct SessionsResponse {
    /// Number of live sessions
    pub total_sessions: usize,
    /// Per-session summaries
    pub sessions: Vec<SessionSummary>,
}

/// GET /api/sessions - List active user sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.sessions.summaries().await;
    Json(SessionsResponse {
        total_sessions: sessions.len(),
        sessions,
    })
}

//! Root and health endpoints

use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// GET / - Service banner
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "Multi-Agent Gateway Backend",
        "status": "running",
        "agents": state.orchestrator.agent_catalog(),
    }))
}

/// GET /api/health - Health check with live counters
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let external_bridge = match &state.bridge {
        Some(bridge) => serde_json::to_value(bridge.status().await)
            .unwrap_or_else(|_| json!({"connected": false})),
        None => json!({"connected": false}),
    };

    let agents: serde_json::Map<String, Value> = state
        .orchestrator
        .agent_domains()
        .into_iter()
        .map(|(id, domain)| (id, Value::String(domain)))
        .collect();

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "active_sessions": state.sessions.count().await,
        "active_connections": state.registry.count().await,
        "external_bridge": external_bridge,
        "agents": agents,
    }))
}

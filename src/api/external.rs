//! External bridge administration endpoints

use crate::bridge::BridgeStatus;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Request body for sending a message over the bridge
///
/// Accepts either field name; `content` wins when both are present.
#[derive(Deserialize)]
pub struct SendToExternalRequest {
    /// Message content
    pub content: Option<String>,
    /// Alternate field name for the content
    pub message: Option<String>,
    /// Agent label attached to the frame
    pub agent: Option<String>,
}

/// Response for a bridge send
#[derive(Serialize)]
pub struct SendToExternalResponse {
    /// Whether the frame was handed to the transport
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

/// GET /api/external/status - Bridge connectivity snapshot
pub async fn external_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    match &state.bridge {
        Some(bridge) => {
            let status: BridgeStatus = bridge.status().await;
            Json(serde_json::to_value(status).unwrap_or_else(|_| json!({"connected": false})))
        }
        None => Json(json!({
            "connected": false,
            "message": "No external bridge configured",
        })),
    }
}

/// POST /api/external/send - Send a message over the bridge
///
/// Fails with 400 when no content is supplied and 503 when the bridge is
/// absent or not connected.
pub async fn send_to_external(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendToExternalRequest>,
) -> Result<Json<SendToExternalResponse>, AppError> {
    let content = request
        .content
        .or(request.message)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(AppError::MissingContent)?;

    let bridge = state.bridge.as_ref().ok_or(AppError::BridgeNotConnected)?;
    if !bridge.status().await.connected {
        return Err(AppError::BridgeNotConnected);
    }

    let agent = request.agent.unwrap_or_else(|| "Manual".to_string());
    let success = bridge.send(&content, &agent).await;

    Ok(Json(SendToExternalResponse {
        success,
        message: "Message sent to external WebSocket".to_string(),
    }))
}

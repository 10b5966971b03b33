//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP
//! responses. All errors implement `IntoResponse` to provide consistent
//! error formatting. Component-internal failures (classifier, responder,
//! bridge transport) have their own typed errors next to the component and
//! never surface here as fatal conditions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// All errors that can cross the HTTP boundary are represented by this enum.
/// Each variant implements automatic conversion to HTTP responses via
/// `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// No session exists for the given user id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A send-to-external request carried no content
    #[error("Message content is required")]
    MissingContent,

    /// The external bridge is not configured or not connected
    #[error("Not connected to external WebSocket")]
    BridgeNotConnected,

    /// File or directory was not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Path is invalid (e.g., escapes the user data directory)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::MissingContent => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::BridgeNotConnected => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::FileNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidPath(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

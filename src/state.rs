//! Shared application state
//!
//! Explicit owned stores with constructor-injected lifetime, handed to the
//! HTTP and WebSocket handlers by reference.

use crate::bridge::ExternalBridge;
use crate::connections::ConnectionRegistry;
use crate::orchestrator::Orchestrator;
use crate::services::files::FileService;
use crate::sessions::SessionStore;
use std::sync::Arc;

/// Everything the handlers need, composed once at startup
pub struct AppState {
    /// Per-user conversation state
    pub sessions: Arc<SessionStore>,
    /// Live local connections
    pub registry: Arc<ConnectionRegistry>,
    /// The message pipeline
    pub orchestrator: Arc<Orchestrator>,
    /// The external bridge, when configured
    pub bridge: Option<Arc<ExternalBridge>>,
    /// Per-user file store
    pub files: Arc<FileService>,
}

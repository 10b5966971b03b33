//! Agent Gateway Backend
//!
//! A real-time conversational gateway: accepts chat messages over
//! per-user WebSocket channels and one bridged connection to an external
//! peer gateway, routes each message to a specialized responder, and
//! relays the response back to the originating channel.

mod agents;
mod api;
mod bridge;
mod config;
mod connections;
mod error;
mod llm;
mod models;
mod orchestrator;
mod router;
mod services;
mod sessions;
mod state;
mod websocket;

use agents::AgentSet;
use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use bridge::ExternalBridge;
use config::Config;
use connections::ConnectionRegistry;
use llm::LlmService;
use orchestrator::Orchestrator;
use router::MessageRouter;
use services::files::FileService;
use sessions::SessionStore;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config.server);

    // Compose the pipeline: leaves first, orchestrator last.
    let files = Arc::new(FileService::new(config.files.data_dir.clone())?);
    let llm = Arc::new(LlmService::new(config.llm.clone()));
    let sessions = Arc::new(SessionStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let message_router = MessageRouter::new(llm.clone());
    let agent_set = AgentSet::standard(llm, files.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        message_router,
        agent_set,
        registry.clone(),
        files.clone(),
    ));

    // External bridge, when a peer URL is configured.
    let external_bridge = match config.bridge.clone() {
        Some(bridge_config) => {
            info!(url = %bridge_config.url, "Setting up external WebSocket bridge");
            let external_bridge = Arc::new(ExternalBridge::new(bridge_config));
            external_bridge.add_handler(orchestrator.clone()).await;
            orchestrator.attach_bridge(external_bridge.clone()).await;

            if external_bridge.connect().await {
                info!("✅ External WebSocket bridge established successfully");
            } else {
                tracing::error!("❌ Failed to establish external WebSocket bridge");
            }
            Some(external_bridge)
        }
        None => {
            info!("No external WebSocket URL configured");
            None
        }
    };

    let app_state = Arc::new(AppState {
        sessions,
        registry,
        orchestrator,
        bridge: external_bridge.clone(),
        files,
    });

    // Build our application with routes
    let app = Router::new()
        .route("/", get(api::status::root))
        .route("/api/health", get(api::status::health_check))
        .route("/api/sessions", get(api::sessions::list_sessions))
        // External bridge administration
        .route("/api/external/status", get(api::external::external_status))
        .route("/api/external/send", post(api::external::send_to_external))
        // Per-user file inspection
        .route("/api/users/:user_id/files", get(api::users::list_user_files))
        .route(
            "/api/users/:user_id/files/:filename",
            get(api::users::get_user_file),
        )
        // WebSocket for real-time chat
        .route("/ws/:user_id", get(websocket::websocket_handler))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(app_state);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("🚀 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close the external channel cleanly.
    if let Some(external_bridge) = external_bridge {
        external_bridge.disconnect().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

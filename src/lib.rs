//! Agent Gateway Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod agents;
pub mod api;
pub mod bridge;
pub mod config;
pub mod connections;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod router;
pub mod services;
pub mod sessions;
pub mod state;
pub mod websocket;

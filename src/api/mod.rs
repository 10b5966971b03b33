//! HTTP API handlers
//!
//! This module contains all HTTP request handlers for the gateway's
//! administrative surface. Each handler function corresponds to a specific
//! API endpoint and handles request/response serialization, state access,
//! and error handling.

pub mod external;
pub mod sessions;
pub mod status;
pub mod users;

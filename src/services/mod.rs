//! Service layer for external collaborators
//!
//! This module contains service abstractions that separate collaborator
//! access from the pipeline, making the code more modular and testable.

pub mod files;

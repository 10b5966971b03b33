//! Per-user file inspection endpoints

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Response for the user file listing
#[derive(Serialize)]
pub struct UserFilesResponse {
    /// Owning user id
    pub user_id: String,
    /// Stored file names
    pub files: Vec<String>,
}

/// Response for a single user file
#[derive(Serialize)]
pub struct UserFileResponse {
    /// Owning user id
    pub user_id: String,
    /// File name
    pub filename: String,
    /// File content
    pub content: String,
}

/// GET /api/users/:user_id/files - List a user's stored files
pub async fn list_user_files(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserFilesResponse>, AppError> {
    let files = state.files.list_user_files(&user_id).await?;
    Ok(Json(UserFilesResponse { user_id, files }))
}

/// GET /api/users/:user_id/files/:filename - Read one stored file
pub async fn get_user_file(
    State(state): State<Arc<AppState>>,
    Path((user_id, filename)): Path<(String, String)>,
) -> Result<Json<UserFileResponse>, AppError> {
    let content = state
        .files
        .read_file(&user_id, &filename)
        .await?
        .ok_or_else(|| AppError::FileNotFound(filename.clone()))?;

    Ok(Json(UserFileResponse {
        user_id,
        filename,
        content,
    }))
}

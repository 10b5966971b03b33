//! Per-user file store
//!
//! Stores conversation logs and structured JSON data in a directory per
//! user. This is the persistence collaborator of the pipeline: every write
//! is best-effort from the caller's point of view, and identifiers are
//! validated so a user id or filename can never escape the base directory.

use crate::error::AppError;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Per-user file store rooted at a base directory
pub struct FileService {
    base_dir: PathBuf,
}

impl FileService {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create data dir: {e}"))?;
        Ok(Self { base_dir })
    }

    /// Reject identifiers that could traverse out of the base directory
    fn validate_component(value: &str) -> Result<(), AppError> {
        if value.is_empty()
            || value == "."
            || value == ".."
            || value.contains('/')
            || value.contains('\\')
        {
            return Err(AppError::InvalidPath(value.to_string()));
        }
        Ok(())
    }

    /// Resolve (and create) the directory for a user
    async fn user_dir(&self, user_id: &str) -> Result<PathBuf, AppError> {
        Self::validate_component(user_id)?;
        let dir = self.base_dir.join(user_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create user dir: {e}"))?;
        Ok(dir)
    }

    async fn user_file(&self, user_id: &str, filename: &str) -> Result<PathBuf, AppError> {
        Self::validate_component(filename)?;
        Ok(self.user_dir(user_id).await?.join(filename))
    }

    /// Append a timestamped entry to a per-user log file
    pub async fn log_to_file(
        &self,
        user_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<(), AppError> {
        let path = self.user_file(user_id, filename).await?;
        let entry = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), content);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open log file: {e}"))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to append to log file: {e}"))?;
        file.flush()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to flush log file: {e}"))?;

        debug!(user_id = %user_id, file = %filename, "Appended log entry");
        Ok(())
    }

    /// Save structured data as pretty-printed JSON, stamping `last_updated`
    pub async fn save_json(
        &self,
        user_id: &str,
        filename: &str,
        mut data: Value,
    ) -> Result<(), AppError> {
        let path = self.user_file(user_id, filename).await?;
        if let Some(obj) = data.as_object_mut() {
            obj.insert(
                "last_updated".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        let body = serde_json::to_string_pretty(&data)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON: {e}"))?;
        fs::write(&path, body)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write JSON file: {e}"))?;
        Ok(())
    }

    /// Load structured data; `None` when the file does not exist
    pub async fn load_json(&self, user_id: &str, filename: &str) -> Result<Option<Value>, AppError> {
        let path = self.user_file(user_id, filename).await?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read JSON file: {e}"))?;
        let value = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse JSON file: {e}"))?;
        Ok(Some(value))
    }

    /// Read an entire file; `None` when it does not exist
    pub async fn read_file(&self, user_id: &str, filename: &str) -> Result<Option<String>, AppError> {
        let path = self.user_file(user_id, filename).await?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read file: {e}"))?;
        Ok(Some(content))
    }

    /// List the files stored for a user
    pub async fn list_user_files(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        Self::validate_component(user_id)?;
        let dir = self.base_dir.join(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read user dir: {e}"))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read dir entry: {e}"))?
        {
            if entry.path().is_file() {
                if let Some(name) = entry.path().file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// The base directory this store writes under
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

//! Artifact storage for patches, logs, and reports.
//!
//! This module provides file-based storage for per-job artifacts.
//! Patches and logs are keyed by task id and patch source, so re-running
//! a task overwrites its previous artifacts instead of accumulating
//! stale copies.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::patch::PatchSource;

/// Subdirectory for candidate patches.
const PATCH_DIR: &str = "patches";

/// Subdirectory for per-job logs.
const LOG_DIR: &str = "logs";

/// Subdirectory for batch reports.
const REPORT_DIR: &str = "reports";

/// Errors that can occur during artifact storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage directory creation failed.
    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),
}

/// File-based storage for batch run artifacts.
///
/// Layout under the base directory:
///
/// ```text
/// <base>/patches/<task_id>-<source>.diff
/// <base>/logs/<task_id>-<source>.log
/// <base>/reports/<name>
/// ```
pub struct ArtifactStore {
    base_path: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the base storage path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the directory layout, failing fast on unwritable paths.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.ensure_directories().await
    }

    /// Ensures the storage directory structure exists.
    async fn ensure_directories(&self) -> Result<(), StorageError> {
        for dir in [PATCH_DIR, LOG_DIR, REPORT_DIR] {
            let path = self.base_path.join(dir);
            if !path.exists() {
                fs::create_dir_all(&path).await.map_err(|e| {
                    StorageError::DirectoryCreationFailed(format!(
                        "Failed to create directory {:?}: {}",
                        path, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Stores a candidate patch, returning the file location.
    pub async fn write_patch(
        &self,
        task_id: &str,
        source: PatchSource,
        diff: &str,
    ) -> Result<String, StorageError> {
        self.ensure_directories().await?;
        let path = self
            .base_path
            .join(PATCH_DIR)
            .join(format!("{}-{}.diff", task_id, source));
        fs::write(&path, diff).await?;
        Ok(path.display().to_string())
    }

    /// Stores a per-job log, returning the file location.
    pub async fn write_log(
        &self,
        task_id: &str,
        source: PatchSource,
        content: &str,
    ) -> Result<String, StorageError> {
        self.ensure_directories().await?;
        let path = self
            .base_path
            .join(LOG_DIR)
            .join(format!("{}-{}.log", task_id, source));
        fs::write(&path, content).await?;
        Ok(path.display().to_string())
    }

    /// Stores a batch report under the given file name.
    pub async fn write_report(&self, name: &str, content: &str) -> Result<String, StorageError> {
        self.ensure_directories().await?;
        let path = self.base_path.join(REPORT_DIR).join(name);
        fs::write(&path, content).await?;
        Ok(path.display().to_string())
    }
}

//! File-based artifact storage.
//!
//! Batch runs leave patches, per-job logs, and reports on the
//! filesystem so failed evaluations can be audited after the fact.
//! Artifacts are keyed by task id and patch source; re-running a task
//! overwrites its previous artifacts.

pub mod artifacts;

// Re-export main types for convenience
pub use artifacts::{ArtifactStore, StorageError};

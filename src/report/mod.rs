//! Verdict reporting for finished batch runs.
//!
//! Turns a [`crate::scheduler::BatchRun`] into a deterministic summary:
//! per-task verdict records ordered by task id, a failure histogram,
//! and aggregate runtime statistics, rendered as text for terminals or
//! JSON for downstream tooling.

pub mod render;
pub mod summary;

// Re-export main types for convenience
pub use render::render_text;
pub use summary::{BatchSummary, RuntimeStats, TaskRecord};

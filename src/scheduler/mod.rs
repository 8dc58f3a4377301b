//! Bounded-concurrency scheduler for evaluation batches.
//!
//! This module drives a batch of tasks through the evaluation pipeline:
//!
//! - **BatchConfig**: task selection, timeouts, worker count, retries
//! - **BatchRunner**: fans jobs out to workers under a semaphore cap
//! - **Job**: one task's journey from dispatch to verdict
//! - **ProgressMonitor**: periodic progress logging for long batches
//!
//! # Architecture
//!
//! ```text
//!   ┌─────────┐     ┌──────────────┐     ┌──────────────┐
//!   │ Catalog │ ──▶ │  BatchRunner │ ──▶ │   Verdicts   │
//!   └─────────┘     └──────┬───────┘     └──────────────┘
//!                          │ semaphore (max_workers)
//!          ┌───────────────┼───────────────┐
//!          ▼               ▼               ▼
//!     ┌─────────┐     ┌─────────┐     ┌─────────┐
//!     │  Job 1  │     │  Job 2  │     │  Job N  │
//!     │ agent → │     │ agent → │     │ agent → │
//!     │ harness │     │ harness │     │ harness │
//!     └─────────┘     └─────────┘     └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use swe_arbiter::catalog::TaskCatalog;
//! use swe_arbiter::harness::FixtureHarness;
//! use swe_arbiter::scheduler::{BatchConfig, BatchRunner};
//! use std::sync::Arc;
//!
//! let catalog = TaskCatalog::new(tasks);
//! let runner = BatchRunner::new(client, Arc::new(FixtureHarness::new()));
//!
//! let config = BatchConfig::default()
//!     .with_sample_size(25)
//!     .with_seed(42)
//!     .with_max_workers(8);
//!
//! let run = runner.run(&catalog, config).await?;
//! println!("resolved {}/{}", run.resolved_count(), run.jobs.len());
//! ```
//!
//! # Determinism
//!
//! Verdicts depend only on participant replies and harness outcomes,
//! never on worker interleaving: the same selection evaluated with one
//! worker or many produces the same per-task verdicts.

pub mod config;
pub mod job;
pub mod progress;
pub mod runner;

// Re-export main types for convenience
pub use config::{BatchConfig, ConfigError};
pub use job::{Job, JobStatus, Verdict};
pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use runner::{BatchRun, BatchRunner};

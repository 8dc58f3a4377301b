//! swe_arbiter: Evaluation orchestrator for autonomous coding agents.
//!
//! This library provides tools for loading SWE-bench style bug-fix tasks,
//! collecting candidate patches from a participant agent endpoint,
//! evaluating them with a pluggable harness, and reporting deterministic
//! per-task verdicts.

// Core modules
pub mod agent;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod harness;
pub mod patch;
pub mod report;
pub mod scheduler;
pub mod storage;

// Re-export commonly used error types
pub use error::{AgentError, ArbiterError, CatalogError, HarnessError};

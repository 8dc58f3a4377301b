//! Command-line interface for swe_arbiter.
//!
//! Provides commands for running evaluation batches against a participant
//! agent and for inspecting task catalogs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};

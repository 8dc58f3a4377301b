//! Job definitions for the evaluation scheduler.
//!
//! This module defines the types a batch run is made of:
//!
//! - `Job`: one task moving through the dispatch/evaluate pipeline
//! - `JobStatus`: lifecycle state of a job
//! - `Verdict`: the binary result derived from a recorded outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Task;
use crate::harness::{EvaluationOutcome, FailureKind};
use crate::patch::Patch;

/// Lifecycle state of a job.
///
/// Jobs move strictly forward: `Pending` to `Dispatched`, then either
/// `AgentResponded` or `AgentFailed`, then either `Evaluated` or
/// `EvalFailed`, and finally `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet handed to a worker.
    Pending,
    /// The participant call is in flight.
    Dispatched,
    /// The participant produced a reply.
    AgentResponded,
    /// The participant could not be reached.
    AgentFailed,
    /// The harness returned an outcome.
    Evaluated,
    /// The harness itself faulted.
    EvalFailed,
    /// Terminal state; the verdict is recorded.
    Done,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Dispatched => write!(f, "dispatched"),
            JobStatus::AgentResponded => write!(f, "agent_responded"),
            JobStatus::AgentFailed => write!(f, "agent_failed"),
            JobStatus::Evaluated => write!(f, "evaluated"),
            JobStatus::EvalFailed => write!(f, "eval_failed"),
            JobStatus::Done => write!(f, "done"),
        }
    }
}

/// Binary result of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Every required test reached its required state.
    Pass,
    /// Anything else.
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// One task moving through a batch run.
///
/// A job owns everything the run learned about its task: the candidate
/// patch, the evaluation outcome, any fault message, and the artifact
/// location. The scheduler records exactly one outcome per job; the
/// verdict is derived from it, never stored separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: Uuid,
    /// The task under evaluation.
    pub task: Task,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Candidate patch, once extracted from the participant reply.
    #[serde(default)]
    pub patch: Option<Patch>,
    /// Evaluation outcome, once recorded.
    #[serde(default)]
    pub outcome: Option<EvaluationOutcome>,
    /// Fault message for unreachable participants or harness faults.
    #[serde(default)]
    pub error: Option<String>,
    /// Where this job's artifacts were written.
    #[serde(default)]
    pub logs_uri: Option<String>,
    /// Milliseconds spent obtaining the candidate, including retries.
    pub agent_ms: u64,
    /// When this job was created.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a pending job for a task.
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            status: JobStatus::Pending,
            patch: None,
            outcome: None,
            error: None,
            logs_uri: None,
            agent_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// Records the evaluation outcome.
    ///
    /// The first recorded outcome wins; later calls are ignored.
    pub fn record_outcome(&mut self, outcome: EvaluationOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    /// The verdict derived from the recorded outcome, if any.
    pub fn verdict(&self) -> Option<Verdict> {
        self.outcome.as_ref().map(|outcome| {
            if outcome.resolved() {
                Verdict::Pass
            } else {
                Verdict::Fail
            }
        })
    }

    /// The failure kind of the recorded outcome, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.outcome.as_ref().and_then(|outcome| outcome.failure_kind)
    }

    /// Milliseconds the evaluation took, zero when none ran.
    pub fn runtime_ms(&self) -> u64 {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.runtime_ms)
            .unwrap_or(0)
    }

    /// Whether the job reached its terminal state.
    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

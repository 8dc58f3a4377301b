//! Batch summaries: per-task verdict records and aggregate statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Dataset;
use crate::harness::FailureKind;
use crate::scheduler::{BatchRun, Job, Verdict};

/// One task's verdict record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task the record belongs to.
    pub task_id: String,
    /// Binary verdict.
    pub verdict: Verdict,
    /// Required tests that reached their required state.
    pub tests_passed: usize,
    /// Size of the required test union.
    pub total_tests: usize,
    /// Failure classification, `null` on PASS.
    pub failure_type: Option<FailureKind>,
    /// Milliseconds the evaluation took.
    pub runtime_ms: u64,
    /// Where the job's artifacts were written.
    #[serde(default)]
    pub logs_uri: Option<String>,
}

impl TaskRecord {
    /// Builds a record from a terminal job.
    pub fn from_job(job: &Job) -> Self {
        let (tests_passed, total_tests) = job
            .outcome
            .as_ref()
            .map(|outcome| (outcome.tests_passed, outcome.total_tests))
            .unwrap_or((0, 0));

        Self {
            task_id: job.task.task_id.clone(),
            verdict: job.verdict().unwrap_or(Verdict::Fail),
            tests_passed,
            total_tests,
            failure_type: job.failure_kind(),
            runtime_ms: job.runtime_ms(),
            logs_uri: job.logs_uri.clone(),
        }
    }
}

/// Aggregate runtime statistics over a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Fastest evaluation in milliseconds.
    pub min_ms: u64,
    /// Slowest evaluation in milliseconds.
    pub max_ms: u64,
    /// Mean evaluation time, rounded to one decimal.
    pub avg_ms: f64,
}

impl RuntimeStats {
    fn over(records: &[TaskRecord]) -> Self {
        if records.is_empty() {
            return Self {
                min_ms: 0,
                max_ms: 0,
                avg_ms: 0.0,
            };
        }

        let mut min_ms = u64::MAX;
        let mut max_ms = 0;
        let mut sum: u64 = 0;
        for record in records {
            min_ms = min_ms.min(record.runtime_ms);
            max_ms = max_ms.max(record.runtime_ms);
            sum += record.runtime_ms;
        }

        Self {
            min_ms,
            max_ms,
            avg_ms: round1(sum as f64 / records.len() as f64),
        }
    }
}

/// Deterministic summary of one batch run.
///
/// Records are ordered by task id, so two runs over the same selection
/// produce byte-identical summaries regardless of worker interleaving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Identifier of the run this summarizes.
    pub run_id: Uuid,
    /// Dataset the tasks came from.
    pub dataset: Dataset,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the whole run in milliseconds.
    pub total_runtime_ms: u64,
    /// Number of tasks evaluated.
    pub total: usize,
    /// Number of PASS verdicts.
    pub resolved: usize,
    /// Resolution rate as a percentage, one decimal.
    pub resolution_pct: f64,
    /// Failure histogram over FAIL verdicts.
    pub failures: BTreeMap<FailureKind, usize>,
    /// Aggregate runtime statistics.
    pub runtime: RuntimeStats,
    /// Per-task records, ordered by task id.
    pub records: Vec<TaskRecord>,
}

impl BatchSummary {
    /// Summarizes a finished batch run.
    pub fn from_run(run: &BatchRun) -> Self {
        let mut records: Vec<TaskRecord> = run.jobs.iter().map(TaskRecord::from_job).collect();
        records.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        let total = records.len();
        let resolved = records
            .iter()
            .filter(|record| record.verdict == Verdict::Pass)
            .count();
        let resolution_pct = if total > 0 {
            round1(resolved as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        let mut failures: BTreeMap<FailureKind, usize> = BTreeMap::new();
        for record in &records {
            if let Some(kind) = record.failure_type {
                *failures.entry(kind).or_insert(0) += 1;
            }
        }

        let runtime = RuntimeStats::over(&records);

        Self {
            run_id: run.id,
            dataset: run.config.dataset,
            started_at: run.started_at,
            total_runtime_ms: run.total_runtime_ms,
            total,
            resolved,
            resolution_pct,
            failures,
            runtime,
            records,
        }
    }

    /// Serializes the summary as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Round to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

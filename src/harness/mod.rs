//! Evaluation harness boundary.
//!
//! The orchestrator never applies patches or runs tests itself; it hands a
//! task and a candidate patch to an [`EvaluationHarness`] and consumes the
//! structured outcome. Any backend satisfying the contract is
//! substitutable: the command backend shells out to a real harness
//! executable, the fixture backend is scripted and deterministic for tests
//! and dry runs.

pub mod command;
pub mod fixture;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::Task;
use crate::error::HarnessError;
use crate::patch::Patch;

pub use command::CommandHarness;
pub use fixture::{FixtureBehavior, FixtureHarness};

/// Why a job did not resolve its task. Closed set; every job-level fault
/// maps onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Patch absent, unparseable, or does not apply to the base revision.
    ApplyError,
    /// Environment could not be prepared before any test ran.
    BuildError,
    /// Patch applied but a required test is not in its required state.
    TestFailure,
    /// A stage exceeded its time budget.
    Timeout,
    /// Transport or adapter-internal fault unrelated to patch correctness.
    InfraError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ApplyError => "apply_error",
            FailureKind::BuildError => "build_error",
            FailureKind::TestFailure => "test_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::InfraError => "infra_error",
        };
        write!(f, "{}", name)
    }
}

/// State of a single test after evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test ran and passed.
    Passed,
    /// Test ran and failed.
    Failed,
    /// Test errored before producing a result.
    Error,
}

/// Structured result of evaluating one patch against one task.
///
/// Produced exactly once per job and never mutated afterwards. Counts are
/// over the union of the task's `fail_to_pass` and `pass_to_pass` sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Required tests observed passing.
    pub tests_passed: usize,
    /// Size of the required test union.
    pub total_tests: usize,
    /// Per-test states reported by the harness.
    pub per_test: BTreeMap<String, TestStatus>,
    /// `None` means the task is resolved.
    pub failure_kind: Option<FailureKind>,
    /// Wall-clock evaluation time in milliseconds.
    pub runtime_ms: u64,
}

impl EvaluationOutcome {
    /// Derive an outcome from per-test results.
    ///
    /// `expected` is the required test union. A required test that is
    /// missing from `per_test` or not passing makes the outcome a
    /// `test_failure`; an empty union resolves vacuously.
    pub fn from_test_results(
        expected: &[String],
        per_test: BTreeMap<String, TestStatus>,
        runtime_ms: u64,
    ) -> Self {
        let tests_passed = expected
            .iter()
            .filter(|t| matches!(per_test.get(t.as_str()), Some(TestStatus::Passed)))
            .count();
        let total_tests = expected.len();
        let failure_kind = if tests_passed < total_tests {
            Some(FailureKind::TestFailure)
        } else {
            None
        };

        Self {
            tests_passed,
            total_tests,
            per_test,
            failure_kind,
            runtime_ms,
        }
    }

    /// An outcome for a structured failure with no passing tests.
    pub fn failed(kind: FailureKind, total_tests: usize, runtime_ms: u64) -> Self {
        Self {
            tests_passed: 0,
            total_tests,
            per_test: BTreeMap::new(),
            failure_kind: Some(kind),
            runtime_ms,
        }
    }

    /// Whether the task is resolved.
    pub fn resolved(&self) -> bool {
        self.failure_kind.is_none()
    }
}

/// Boundary to the external test-execution harness.
///
/// Contract (regardless of backend):
/// - patch does not apply cleanly: `apply_error` with zero tests passed
/// - environment fails before any test runs: `build_error`
/// - execution exceeds `timeout`: `timeout` with whatever partial counts
///   are known
/// - otherwise per-test results for the required union; `test_failure` iff
///   any required test is not in its required state
///
/// An `Err` signals a fault inside the backend itself; the scheduler folds
/// it into an `infra_error` outcome for that job. A returned outcome is
/// authoritative and is never retried.
#[async_trait]
pub trait EvaluationHarness: Send + Sync {
    /// Apply `patch` for `task` and judge the result within `timeout`.
    async fn evaluate(
        &self,
        task: &Task,
        patch: &Patch,
        timeout: Duration,
    ) -> Result<EvaluationOutcome, HarnessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Vec<String> {
        vec!["test_a".to_string(), "test_b".to_string()]
    }

    #[test]
    fn test_outcome_all_passing_resolves() {
        let per_test: BTreeMap<String, TestStatus> = [
            ("test_a".to_string(), TestStatus::Passed),
            ("test_b".to_string(), TestStatus::Passed),
        ]
        .into_iter()
        .collect();

        let outcome = EvaluationOutcome::from_test_results(&expected(), per_test, 1200);
        assert!(outcome.resolved());
        assert_eq!(outcome.tests_passed, 2);
        assert_eq!(outcome.total_tests, 2);
        assert_eq!(outcome.failure_kind, None);
    }

    #[test]
    fn test_outcome_failing_test_is_test_failure() {
        let per_test: BTreeMap<String, TestStatus> = [
            ("test_a".to_string(), TestStatus::Passed),
            ("test_b".to_string(), TestStatus::Failed),
        ]
        .into_iter()
        .collect();

        let outcome = EvaluationOutcome::from_test_results(&expected(), per_test, 900);
        assert!(!outcome.resolved());
        assert_eq!(outcome.tests_passed, 1);
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
    }

    #[test]
    fn test_outcome_missing_test_counts_as_failure() {
        let per_test: BTreeMap<String, TestStatus> =
            [("test_a".to_string(), TestStatus::Passed)].into_iter().collect();

        let outcome = EvaluationOutcome::from_test_results(&expected(), per_test, 10);
        assert_eq!(outcome.tests_passed, 1);
        assert_eq!(outcome.total_tests, 2);
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
    }

    #[test]
    fn test_outcome_empty_union_resolves_vacuously() {
        let outcome = EvaluationOutcome::from_test_results(&[], BTreeMap::new(), 5);
        assert!(outcome.resolved());
        assert_eq!(outcome.total_tests, 0);
    }

    #[test]
    fn test_failed_outcome_has_zero_passed() {
        let outcome = EvaluationOutcome::failed(FailureKind::ApplyError, 4, 300);
        assert_eq!(outcome.tests_passed, 0);
        assert_eq!(outcome.total_tests, 4);
        assert_eq!(outcome.failure_kind, Some(FailureKind::ApplyError));
        assert!(!outcome.resolved());
    }

    #[test]
    fn test_failure_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&FailureKind::ApplyError).unwrap(),
            "\"apply_error\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::TestFailure).unwrap(),
            "\"test_failure\""
        );
        assert_eq!(FailureKind::InfraError.to_string(), "infra_error");
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_test_status_serialization() {
        assert_eq!(serde_json::to_string(&TestStatus::Passed).unwrap(), "\"passed\"");
        let status: TestStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(status, TestStatus::Error);
    }
}

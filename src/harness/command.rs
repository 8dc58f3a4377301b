//! Harness backend that shells out to an external evaluator.
//!
//! Each evaluation gets its own run directory under the configured work
//! dir, staged with `patch.diff` and `task.json`. The executable is
//! invoked as:
//!
//! ```text
//! <command...> --task-id <id> --patch <file> --report <file> --timeout <secs>
//! ```
//!
//! with the run directory as its working directory. Results are read from
//! `report.json` (the SWE-bench report shapes are understood); when no
//! usable report exists, recognizable output patterns (patch-apply
//! failures, build failures, pytest-style counts) are mapped onto the
//! outcome contract. Counts recovered from output scans are approximate:
//! they reflect whatever the backend ran, not necessarily the required
//! union.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{EvaluationHarness, EvaluationOutcome, FailureKind, TestStatus};
use crate::catalog::Task;
use crate::error::HarnessError;
use crate::patch::Patch;

/// Extra seconds granted beyond the evaluation timeout before the
/// subprocess is killed.
const DEFAULT_GRACE_SECS: u64 = 60;

/// Deadline for the availability probe.
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Patch file staged into each run directory.
const PATCH_FILE: &str = "patch.diff";

/// Task description staged into each run directory.
const TASK_FILE: &str = "task.json";

/// Report file the harness is expected to write.
const REPORT_FILE: &str = "report.json";

/// Evaluation backend invoking a harness executable per job.
pub struct CommandHarness {
    /// Program and leading arguments.
    command: Vec<String>,
    /// Directory run directories are created under.
    work_dir: PathBuf,
    /// Seconds allowed beyond the evaluation timeout.
    grace_seconds: u64,
}

impl CommandHarness {
    /// Create a backend for the given command line.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::SpawnFailed` when the command is empty.
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        if command.is_empty() {
            return Err(HarnessError::SpawnFailed(
                "harness command is empty".to_string(),
            ));
        }
        Ok(Self {
            command,
            work_dir: work_dir.into(),
            grace_seconds: DEFAULT_GRACE_SECS,
        })
    }

    /// Override the kill grace period.
    pub fn with_grace(mut self, seconds: u64) -> Self {
        self.grace_seconds = seconds;
        self
    }

    /// Check that the harness executable responds.
    ///
    /// Runs the command with `--version` under a short deadline and
    /// returns the reported version string.
    pub async fn probe(&self) -> Result<String, HarnessError> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).arg("--version").kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), cmd.output())
            .await
            .map_err(|_| HarnessError::Timeout {
                seconds: PROBE_TIMEOUT_SECS,
            })?
            .map_err(|e| HarnessError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(HarnessError::SpawnFailed(format!(
                "probe exited with status {:?}",
                output.status.code()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            Ok("unknown".to_string())
        } else {
            Ok(version)
        }
    }
}

#[async_trait]
impl EvaluationHarness for CommandHarness {
    async fn evaluate(
        &self,
        task: &Task,
        patch: &Patch,
        timeout: Duration,
    ) -> Result<EvaluationOutcome, HarnessError> {
        let expected = task.expected_tests();

        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = self
            .work_dir
            .join(format!("{}-{}", task.task_id, &run_id[..8]));
        fs::create_dir_all(&run_dir).await?;

        // git apply rejects a diff without a trailing newline
        let mut patch_text = patch.content.clone();
        if !patch_text.ends_with('\n') {
            patch_text.push('\n');
        }
        let patch_path = run_dir.join(PATCH_FILE);
        fs::write(&patch_path, &patch_text).await?;
        fs::write(run_dir.join(TASK_FILE), serde_json::to_vec_pretty(task)?).await?;

        let report_path = run_dir.join(REPORT_FILE);
        let deadline = timeout + Duration::from_secs(self.grace_seconds);

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg("--task-id")
            .arg(&task.task_id)
            .arg("--patch")
            .arg(&patch_path)
            .arg("--report")
            .arg(&report_path)
            .arg("--timeout")
            .arg(timeout.as_secs().to_string())
            .current_dir(&run_dir)
            .kill_on_drop(true);

        debug!(task_id = %task.task_id, run_dir = %run_dir.display(), "invoking harness");
        let started = Instant::now();

        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(result) => result.map_err(|e| HarnessError::SpawnFailed(e.to_string()))?,
            Err(_) => {
                warn!(
                    task_id = %task.task_id,
                    seconds = deadline.as_secs(),
                    "harness subprocess exceeded deadline"
                );
                return Ok(EvaluationOutcome::failed(
                    FailureKind::Timeout,
                    expected.len(),
                    started.elapsed().as_millis() as u64,
                ));
            }
        };

        let runtime_ms = started.elapsed().as_millis() as u64;

        if let Ok(raw) = fs::read_to_string(&report_path).await {
            match parse_report(task, &raw, runtime_ms) {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "unusable harness report, scanning output");
                }
            }
        }

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if let Some(outcome) =
            outcome_from_output(&expected, &combined, output.status.success(), runtime_ms)
        {
            return Ok(outcome);
        }

        let preview: String = combined.chars().take(200).collect();
        Err(HarnessError::MissingReport(format!(
            "exit status {:?}, output: {}",
            output.status.code(),
            preview.trim()
        )))
    }
}

/// Parse a harness report into an outcome.
///
/// The report may be keyed by task id or contain the entry directly.
/// Per-test data (grouped SWE-bench `tests_status` or a flat
/// test-to-state map) takes precedence; a bare `resolved` flag is
/// accepted as a coarse result.
fn parse_report(task: &Task, raw: &str, runtime_ms: u64) -> Result<EvaluationOutcome, HarnessError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| HarnessError::ReportParse(e.to_string()))?;
    let entry_value = match value.get(task.task_id.as_str()) {
        Some(entry) => entry.clone(),
        None => value,
    };
    let entry: ReportEntry = serde_json::from_value(entry_value)
        .map_err(|e| HarnessError::ReportParse(e.to_string()))?;

    let expected = task.expected_tests();

    if let Some(status) = entry.tests_status {
        let per_test = status.into_per_test();
        return Ok(EvaluationOutcome::from_test_results(
            &expected, per_test, runtime_ms,
        ));
    }

    match entry.resolved {
        Some(true) => Ok(EvaluationOutcome {
            tests_passed: expected.len(),
            total_tests: expected.len(),
            per_test: BTreeMap::new(),
            failure_kind: None,
            runtime_ms,
        }),
        Some(false) => Ok(EvaluationOutcome::failed(
            FailureKind::TestFailure,
            expected.len(),
            runtime_ms,
        )),
        None => Err(HarnessError::ReportParse(
            "report carries neither tests_status nor resolved".to_string(),
        )),
    }
}

/// Map recognizable output patterns onto an outcome.
///
/// Returns `None` when the output carries no signal and the process
/// exited cleanly; the caller treats that as a missing report.
fn outcome_from_output(
    expected: &[String],
    output: &str,
    exit_ok: bool,
    runtime_ms: u64,
) -> Option<EvaluationOutcome> {
    let lower = output.to_lowercase();

    if lower.contains("patch does not apply") || lower.contains("error: patch failed") {
        return Some(EvaluationOutcome::failed(
            FailureKind::ApplyError,
            expected.len(),
            runtime_ms,
        ));
    }
    if lower.contains("build failed") || lower.contains("compilation error") {
        return Some(EvaluationOutcome::failed(
            FailureKind::BuildError,
            expected.len(),
            runtime_ms,
        ));
    }

    if let Some((passed, total)) = extract_test_counts(output) {
        let failure_kind = if passed < total {
            Some(FailureKind::TestFailure)
        } else {
            None
        };
        return Some(EvaluationOutcome {
            tests_passed: passed,
            total_tests: total,
            per_test: BTreeMap::new(),
            failure_kind,
            runtime_ms,
        });
    }

    if output.contains("PASSED") && !output.contains("FAILED") {
        return Some(EvaluationOutcome {
            tests_passed: expected.len(),
            total_tests: expected.len(),
            per_test: BTreeMap::new(),
            failure_kind: None,
            runtime_ms,
        });
    }
    if output.contains("FAILED") || !exit_ok {
        return Some(EvaluationOutcome::failed(
            FailureKind::TestFailure,
            expected.len(),
            runtime_ms,
        ));
    }

    None
}

/// Extract pass/total counts from pytest-style output.
fn extract_test_counts(output: &str) -> Option<(usize, usize)> {
    let summary = Regex::new(r"(\d+)\s+passed(?:,\s*(\d+)\s+failed)?(?:,\s*(\d+)\s+error)?").ok()?;
    if let Some(caps) = summary.captures(output) {
        let passed: usize = caps[1].parse().ok()?;
        let failed: usize = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let errors: usize = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        return Some((passed, passed + failed + errors));
    }

    let ratio = Regex::new(r"(?i)(\d+)/(\d+)\s+tests?\s+passed").ok()?;
    if let Some(caps) = ratio.captures(output) {
        return Some((caps[1].parse().ok()?, caps[2].parse().ok()?));
    }

    None
}

/// One report entry for a task.
#[derive(Debug, Deserialize)]
struct ReportEntry {
    /// Coarse resolution flag.
    #[serde(default)]
    resolved: Option<bool>,
    /// Per-test data, when the harness provides it.
    #[serde(default, alias = "tests")]
    tests_status: Option<TestsStatus>,
}

/// Per-test report shapes produced by harness versions in the wild.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestsStatus {
    /// SWE-bench grouped shape with success/failure name lists.
    Grouped {
        #[serde(rename = "FAIL_TO_PASS", default)]
        fail_to_pass: StatusGroup,
        #[serde(rename = "PASS_TO_PASS", default)]
        pass_to_pass: StatusGroup,
    },
    /// Flat test-to-state map ("PASSED" / "FAILED").
    Flat(BTreeMap<String, String>),
}

/// Success/failure name lists for one test group.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusGroup {
    #[serde(default)]
    success: Vec<String>,
    #[serde(default)]
    failure: Vec<String>,
}

impl TestsStatus {
    fn into_per_test(self) -> BTreeMap<String, TestStatus> {
        match self {
            TestsStatus::Grouped {
                fail_to_pass,
                pass_to_pass,
            } => {
                let mut per_test = BTreeMap::new();
                for group in [fail_to_pass, pass_to_pass] {
                    for test in group.success {
                        per_test.insert(test, TestStatus::Passed);
                    }
                    for test in group.failure {
                        per_test.insert(test, TestStatus::Failed);
                    }
                }
                per_test
            }
            TestsStatus::Flat(map) => map
                .into_iter()
                .map(|(test, state)| {
                    let status = match state.to_uppercase().as_str() {
                        "PASSED" | "PASS" => TestStatus::Passed,
                        "FAILED" | "FAIL" => TestStatus::Failed,
                        _ => TestStatus::Error,
                    };
                    (test, status)
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_task() -> Task {
        Task {
            task_id: "demo-1".to_string(),
            repo: "demo/repo".to_string(),
            base_commit: Some("abcdef012345".to_string()),
            problem_statement: "Fix it".to_string(),
            hints: None,
            fail_to_pass: vec!["test_a".to_string()],
            pass_to_pass: vec!["test_b".to_string()],
            version: None,
            environment_setup_commit: None,
        }
    }

    fn demo_patch() -> Patch {
        Patch::fixture("demo-1", "diff --git a/x.py b/x.py\n--- a/x.py\n+++ b/x.py\n")
    }

    fn sh_harness(script: &str, work_dir: &std::path::Path) -> CommandHarness {
        CommandHarness::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            work_dir,
        )
        .unwrap()
        .with_grace(2)
    }

    #[test]
    fn test_rejects_empty_command() {
        assert!(matches!(
            CommandHarness::new(Vec::new(), "/tmp"),
            Err(HarnessError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_extract_test_counts_summary() {
        assert_eq!(extract_test_counts("==== 5 passed, 2 failed ===="), Some((5, 7)));
        assert_eq!(extract_test_counts("3 passed in 0.42s"), Some((3, 3)));
        assert_eq!(
            extract_test_counts("1 passed, 1 failed, 1 error"),
            Some((1, 3))
        );
        assert_eq!(extract_test_counts("4/6 tests passed"), Some((4, 6)));
        assert_eq!(extract_test_counts("nothing to see"), None);
    }

    #[test]
    fn test_output_heuristics() {
        let expected = vec!["test_a".to_string(), "test_b".to_string()];

        let outcome =
            outcome_from_output(&expected, "error: patch failed: x.py:3", true, 10).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::ApplyError));
        assert_eq!(outcome.tests_passed, 0);

        let outcome = outcome_from_output(&expected, "Build failed: missing header", true, 10).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::BuildError));

        let outcome = outcome_from_output(&expected, "2 passed in 1.2s", true, 10).unwrap();
        assert_eq!(outcome.failure_kind, None);
        assert_eq!((outcome.tests_passed, outcome.total_tests), (2, 2));

        let outcome = outcome_from_output(&expected, "1 passed, 1 failed", true, 10).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
        assert_eq!((outcome.tests_passed, outcome.total_tests), (1, 2));

        let outcome = outcome_from_output(&expected, "test_a PASSED\ntest_b PASSED", true, 10).unwrap();
        assert_eq!(outcome.failure_kind, None);

        let outcome = outcome_from_output(&expected, "boom", false, 10).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));

        assert!(outcome_from_output(&expected, "all quiet", true, 10).is_none());
    }

    #[test]
    fn test_parse_report_grouped_keyed_by_task() {
        let raw = r#"{"demo-1": {"resolved": true, "tests_status": {
            "FAIL_TO_PASS": {"success": ["test_a"], "failure": []},
            "PASS_TO_PASS": {"success": ["test_b"], "failure": []}}}}"#;
        let outcome = parse_report(&demo_task(), raw, 100).unwrap();
        assert!(outcome.resolved());
        assert_eq!(outcome.tests_passed, 2);
        assert_eq!(outcome.total_tests, 2);
        assert_eq!(outcome.per_test.get("test_a"), Some(&TestStatus::Passed));
    }

    #[test]
    fn test_parse_report_grouped_failure() {
        let raw = r#"{"resolved": false, "tests_status": {
            "FAIL_TO_PASS": {"success": [], "failure": ["test_a"]},
            "PASS_TO_PASS": {"success": ["test_b"], "failure": []}}}"#;
        let outcome = parse_report(&demo_task(), raw, 100).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
        assert_eq!(outcome.tests_passed, 1);
        assert_eq!(outcome.per_test.get("test_a"), Some(&TestStatus::Failed));
    }

    #[test]
    fn test_parse_report_flat_map() {
        let raw = r#"{"tests_status": {"test_a": "PASSED", "test_b": "FAILED"}}"#;
        let outcome = parse_report(&demo_task(), raw, 100).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
        assert_eq!(outcome.tests_passed, 1);
        assert_eq!(outcome.per_test.get("test_b"), Some(&TestStatus::Failed));
    }

    #[test]
    fn test_parse_report_resolved_only() {
        let outcome = parse_report(&demo_task(), r#"{"resolved": true}"#, 50).unwrap();
        assert!(outcome.resolved());
        assert_eq!(outcome.tests_passed, 2);

        let outcome = parse_report(&demo_task(), r#"{"resolved": false}"#, 50).unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::TestFailure));
        assert_eq!(outcome.tests_passed, 0);
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        assert!(parse_report(&demo_task(), "not json", 0).is_err());
        assert!(parse_report(&demo_task(), "{}", 0).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_reads_report() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"printf '%s' '{"demo-1": {"resolved": true, "tests_status": {"FAIL_TO_PASS": {"success": ["test_a"], "failure": []}, "PASS_TO_PASS": {"success": ["test_b"], "failure": []}}}}' > report.json"#;
        let harness = sh_harness(script, dir.path());

        let outcome = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.resolved());
        assert_eq!(outcome.tests_passed, 2);
    }

    #[tokio::test]
    async fn test_evaluate_stages_patch_file() {
        let dir = tempfile::tempdir().unwrap();
        // the fake harness reports failure if the staged patch is missing
        let script = r#"if [ -s patch.diff ] && [ -s task.json ]; then printf '%s' '{"resolved": true}' > report.json; else printf '%s' '{"resolved": false}' > report.json; fi"#;
        let harness = sh_harness(script, dir.path());

        let outcome = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.resolved());
    }

    #[tokio::test]
    async fn test_evaluate_apply_error_from_output() {
        let dir = tempfile::tempdir().unwrap();
        let harness = sh_harness("echo 'error: patch failed: x.py:3'; exit 1", dir.path());

        let outcome = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::ApplyError));
        assert_eq!(outcome.tests_passed, 0);
        assert_eq!(outcome.total_tests, 2);
    }

    #[tokio::test]
    async fn test_evaluate_timeout_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let harness = sh_harness("sleep 30", dir.path()).with_grace(1);

        let outcome = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));
        assert_eq!(outcome.tests_passed, 0);
    }

    #[tokio::test]
    async fn test_evaluate_missing_report_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let harness = sh_harness("true", dir.path());

        let result = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(HarnessError::MissingReport(_))));
    }

    #[tokio::test]
    async fn test_evaluate_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let harness =
            CommandHarness::new(vec!["./no-such-harness-binary".to_string()], dir.path()).unwrap();

        let result = harness
            .evaluate(&demo_task(), &demo_patch(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(HarnessError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_probe_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let harness = sh_harness("echo fake-harness 1.2.3", dir.path());
        assert_eq!(harness.probe().await.unwrap(), "fake-harness 1.2.3");
    }

    #[tokio::test]
    async fn test_probe_spawn_failure() {
        let harness =
            CommandHarness::new(vec!["./no-such-harness-binary".to_string()], "/tmp").unwrap();
        assert!(matches!(
            harness.probe().await,
            Err(HarnessError::SpawnFailed(_))
        ));
    }
}

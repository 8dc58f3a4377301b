//! Batch runner: fans tasks out to workers and collects verdicts.
//!
//! Each job moves through three stages: one outbound participant call
//! (with retries for transient faults), patch extraction, and a single
//! harness evaluation. Worker faults never escape a job; they are folded
//! into the job as infrastructure failures so one bad task cannot sink
//! the batch.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::BatchConfig;
use super::job::{Job, JobStatus, Verdict};
use super::progress::{ProgressCounters, ProgressMonitor};
use crate::agent::ParticipantClient;
use crate::catalog::{Task, TaskCatalog};
use crate::error::{AgentError, ArbiterError};
use crate::harness::{EvaluationHarness, EvaluationOutcome, FailureKind};
use crate::patch::{self, PatchSource};
use crate::storage::ArtifactStore;

/// How often the background monitor logs batch progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchRun {
    /// Unique identifier for this run.
    pub id: Uuid,
    /// Configuration the run executed with.
    pub config: BatchConfig,
    /// All jobs, in dispatch order.
    pub jobs: Vec<Job>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the whole run in milliseconds.
    pub total_runtime_ms: u64,
}

impl BatchRun {
    /// Number of jobs whose verdict is PASS.
    pub fn resolved_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.verdict() == Some(Verdict::Pass))
            .count()
    }
}

/// Drives batches of evaluation jobs under a concurrency cap.
pub struct BatchRunner {
    client: Arc<dyn ParticipantClient>,
    harness: Arc<dyn EvaluationHarness>,
    artifacts: Option<Arc<ArtifactStore>>,
}

impl BatchRunner {
    /// Creates a runner over a participant client and a harness backend.
    pub fn new(client: Arc<dyn ParticipantClient>, harness: Arc<dyn EvaluationHarness>) -> Self {
        Self {
            client,
            harness,
            artifacts: None,
        }
    }

    /// Persist per-job artifacts (patch and log) to the given store.
    pub fn with_artifacts(mut self, store: Arc<ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Execute a batch over tasks selected from the catalog.
    ///
    /// Fails fast on invalid configuration, unknown task ids, or an
    /// empty selection. Once dispatch begins, every selected task comes
    /// back as exactly one terminal job.
    pub async fn run(
        &self,
        catalog: &TaskCatalog,
        config: BatchConfig,
    ) -> Result<BatchRun, ArbiterError> {
        config.validate()?;
        let tasks = select_tasks(catalog, &config)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            run_id = %run_id,
            dataset = %config.dataset,
            jobs = tasks.len(),
            max_workers = config.max_workers,
            timeout_seconds = config.timeout_seconds,
            "Starting batch run"
        );

        let counters = ProgressCounters::new();
        let monitor = ProgressMonitor::start(counters.clone(), tasks.len(), PROGRESS_INTERVAL);

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let mut dispatch_order = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let sem = semaphore.clone();
            let client = Arc::clone(&self.client);
            let harness = Arc::clone(&self.harness);
            let artifacts = self.artifacts.clone();
            let config = config.clone();
            let counters = counters.clone();
            dispatch_order.push(task.clone());
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                run_job(task, client, harness, artifacts, &config, &counters).await
            }));
        }

        // Even a panicking worker yields exactly one terminal job.
        let results = futures::future::join_all(handles).await;
        let jobs: Vec<Job> = dispatch_order
            .into_iter()
            .zip(results)
            .map(|(task, result)| match result {
                Ok(job) => job,
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "Worker task faulted");
                    let union_size = task.expected_tests().len();
                    let mut job = Job::new(task);
                    job.status = JobStatus::Done;
                    job.error = Some(format!("worker fault: {}", err));
                    job.record_outcome(EvaluationOutcome::failed(
                        FailureKind::InfraError,
                        union_size,
                        0,
                    ));
                    job
                }
            })
            .collect();

        monitor.stop().await;

        let total_runtime_ms = started.elapsed().as_millis() as u64;
        let run = BatchRun {
            id: run_id,
            config,
            jobs,
            started_at,
            total_runtime_ms,
        };

        info!(
            run_id = %run.id,
            resolved = run.resolved_count(),
            total = run.jobs.len(),
            elapsed_ms = total_runtime_ms,
            "Batch run finished"
        );

        Ok(run)
    }
}

/// Resolve the configured selection against the catalog.
fn select_tasks(catalog: &TaskCatalog, config: &BatchConfig) -> Result<Vec<Task>, ArbiterError> {
    let tasks = if let Some(ref ids) = config.task_ids {
        catalog.get_many(ids)?
    } else if let Some(size) = config.sample_size {
        catalog.sample(size, config.seed)?
    } else {
        catalog.tasks().to_vec()
    };

    if tasks.is_empty() {
        return Err(ArbiterError::Config(
            "no tasks selected for evaluation".to_string(),
        ));
    }
    Ok(tasks)
}

/// Drive one job through the participant and evaluation stages.
async fn run_job(
    task: Task,
    client: Arc<dyn ParticipantClient>,
    harness: Arc<dyn EvaluationHarness>,
    artifacts: Option<Arc<ArtifactStore>>,
    config: &BatchConfig,
    counters: &ProgressCounters,
) -> Job {
    let mut job = Job::new(task);
    let union_size = job.task.expected_tests().len();
    let call_timeout = Duration::from_secs(config.timeout_seconds);

    job.status = JobStatus::Dispatched;
    counters.dispatched.fetch_add(1, Ordering::Relaxed);
    debug!(task_id = %job.task.task_id, job_id = %job.id, "Dispatching job");

    // Stage 1: one outbound call to the participant. Each attempt gets
    // the full timeout; only transient faults are retried.
    let agent_started = Instant::now();
    let shared_task = Arc::new(job.task.clone());
    let reply = config
        .retry
        .run(|| {
            let client = Arc::clone(&client);
            let task = Arc::clone(&shared_task);
            async move {
                match tokio::time::timeout(call_timeout, client.request(&task)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout {
                        seconds: call_timeout.as_secs(),
                    }),
                }
            }
        })
        .await;
    job.agent_ms = agent_started.elapsed().as_millis() as u64;

    match reply {
        Ok(text) => {
            counters.agent_replies.fetch_add(1, Ordering::Relaxed);
            job.status = JobStatus::AgentResponded;
            match patch::extract(&job.task.task_id, &text) {
                Some(patch) => job.patch = Some(patch),
                None => {
                    // A reply without a usable diff counts as a patch
                    // that cannot apply.
                    debug!(task_id = %job.task.task_id, "No usable patch in reply");
                    job.error = Some("no usable patch in participant reply".to_string());
                    job.record_outcome(EvaluationOutcome::failed(
                        FailureKind::ApplyError,
                        union_size,
                        0,
                    ));
                }
            }
        }
        Err(err) => {
            counters.agent_failures.fetch_add(1, Ordering::Relaxed);
            warn!(task_id = %job.task.task_id, error = %err, "Participant unreachable");
            job.status = JobStatus::AgentFailed;
            job.error = Some(format!("participant unreachable: {}", err));
            job.record_outcome(EvaluationOutcome::failed(
                FailureKind::InfraError,
                union_size,
                0,
            ));
        }
    }

    // Stage 2: one harness evaluation. Outcomes are authoritative and
    // never retried; a hung backend is abandoned at the deadline.
    if let Some(patch) = job.patch.clone() {
        let eval_deadline = call_timeout + Duration::from_secs(config.grace_seconds);
        match tokio::time::timeout(
            eval_deadline,
            harness.evaluate(&job.task, &patch, call_timeout),
        )
        .await
        {
            Ok(Ok(outcome)) => {
                counters.evaluated.fetch_add(1, Ordering::Relaxed);
                job.status = JobStatus::Evaluated;
                job.record_outcome(outcome);
            }
            Ok(Err(err)) => {
                counters.eval_faults.fetch_add(1, Ordering::Relaxed);
                warn!(task_id = %job.task.task_id, error = %err, "Harness fault");
                job.status = JobStatus::EvalFailed;
                job.error = Some(format!("harness fault: {}", err));
                job.record_outcome(EvaluationOutcome::failed(
                    FailureKind::InfraError,
                    union_size,
                    0,
                ));
            }
            Err(_) => {
                counters.evaluated.fetch_add(1, Ordering::Relaxed);
                warn!(
                    task_id = %job.task.task_id,
                    seconds = eval_deadline.as_secs(),
                    "Evaluation exceeded deadline"
                );
                job.status = JobStatus::Evaluated;
                job.record_outcome(EvaluationOutcome::failed(
                    FailureKind::Timeout,
                    union_size,
                    eval_deadline.as_millis() as u64,
                ));
            }
        }
    }

    if let Some(outcome) = &job.outcome {
        if outcome.resolved() {
            counters.resolved.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Stage 3: persist artifacts. Failures here degrade to warnings so
    // the verdict survives.
    if let Some(store) = artifacts {
        write_job_artifacts(&store, &mut job).await;
    }

    job.status = JobStatus::Done;
    counters.done.fetch_add(1, Ordering::Relaxed);

    let verdict = job
        .verdict()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NONE".to_string());
    let failure = job
        .failure_kind()
        .map(|k| k.to_string())
        .unwrap_or_default();
    info!(
        task_id = %job.task.task_id,
        job_id = %job.id,
        verdict = %verdict,
        failure = %failure,
        runtime_ms = job.runtime_ms(),
        agent_ms = job.agent_ms,
        "Job finished"
    );

    job
}

/// Persist the job's patch and log, stamping `logs_uri` on success.
async fn write_job_artifacts(store: &ArtifactStore, job: &mut Job) {
    let source = job
        .patch
        .as_ref()
        .map(|patch| patch.source)
        .unwrap_or(PatchSource::Agent);
    let task_id = job.task.task_id.clone();

    if let Some(patch) = &job.patch {
        if let Err(err) = store.write_patch(&task_id, source, &patch.content).await {
            warn!(task_id = %task_id, error = %err, "Failed to write patch artifact");
        }
    }

    let log = serde_json::to_string_pretty(&job).unwrap_or_else(|_| format!("{:?}", job));
    match store.write_log(&task_id, source, &log).await {
        Ok(uri) => job.logs_uri = Some(uri),
        Err(err) => warn!(task_id = %task_id, error = %err, "Failed to write log artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RetryPolicy;
    use crate::error::HarnessError;
    use crate::harness::{FixtureBehavior, FixtureHarness};
    use crate::patch::Patch;
    use async_trait::async_trait;

    struct StaticClient {
        reply: String,
    }

    #[async_trait]
    impl ParticipantClient for StaticClient {
        async fn request(&self, _task: &Task) -> Result<String, AgentError> {
            Ok(self.reply.clone())
        }
    }

    struct UnreachableClient;

    #[async_trait]
    impl ParticipantClient for UnreachableClient {
        async fn request(&self, _task: &Task) -> Result<String, AgentError> {
            Err(AgentError::RequestFailed("connection refused".to_string()))
        }
    }

    fn task(id: &str) -> Task {
        Task {
            task_id: id.to_string(),
            repo: "demo/repo".to_string(),
            base_commit: None,
            problem_statement: "Fix it".to_string(),
            hints: None,
            fail_to_pass: vec!["test_a".to_string()],
            pass_to_pass: vec!["test_b".to_string()],
            version: None,
            environment_setup_commit: None,
        }
    }

    fn diff_reply() -> String {
        concat!(
            "Here is my fix:\n<patch>\n",
            "diff --git a/x.py b/x.py\n--- a/x.py\n+++ b/x.py\n",
            "@@ -1 +1 @@\n-old\n+new\n</patch>"
        )
        .to_string()
    }

    fn fast_config() -> BatchConfig {
        BatchConfig::default()
            .with_timeout_seconds(5)
            .with_grace_seconds(0)
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_run_batch_resolves_all() {
        let catalog = TaskCatalog::new(vec![task("t-1"), task("t-2")]);
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(FixtureHarness::new()),
        );

        let run = runner.run(&catalog, fast_config()).await.unwrap();

        assert_eq!(run.jobs.len(), 2);
        assert_eq!(run.resolved_count(), 2);
        for job in &run.jobs {
            assert!(job.is_done());
            assert_eq!(job.verdict(), Some(Verdict::Pass));
            assert!(job.patch.is_some());
            assert!(job.outcome.is_some());
        }
    }

    #[tokio::test]
    async fn test_run_batch_agent_unreachable() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let runner = BatchRunner::new(
            Arc::new(UnreachableClient),
            Arc::new(FixtureHarness::new()),
        );

        let run = runner.run(&catalog, fast_config()).await.unwrap();

        let job = &run.jobs[0];
        assert!(job.is_done());
        assert_eq!(job.verdict(), Some(Verdict::Fail));
        assert_eq!(job.failure_kind(), Some(FailureKind::InfraError));
        assert!(job.patch.is_none());
        assert!(job.error.as_deref().unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_run_batch_reply_without_patch() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: "I could not find a fix for this issue.".to_string(),
            }),
            Arc::new(FixtureHarness::new()),
        );

        let run = runner.run(&catalog, fast_config()).await.unwrap();

        let job = &run.jobs[0];
        assert_eq!(job.verdict(), Some(Verdict::Fail));
        assert_eq!(job.failure_kind(), Some(FailureKind::ApplyError));
        let outcome = job.outcome.as_ref().unwrap();
        assert_eq!(outcome.tests_passed, 0);
        assert_eq!(outcome.total_tests, 2);
    }

    #[tokio::test]
    async fn test_run_batch_harness_fault_folds_to_infra() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let harness = FixtureHarness::new()
            .with_default(FixtureBehavior::Error("docker daemon down".to_string()));
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(harness),
        );

        let run = runner.run(&catalog, fast_config()).await.unwrap();

        let job = &run.jobs[0];
        assert_eq!(job.verdict(), Some(Verdict::Fail));
        assert_eq!(job.failure_kind(), Some(FailureKind::InfraError));
        assert!(job.error.as_deref().unwrap().contains("harness fault"));
    }

    struct PanickyHarness;

    #[async_trait]
    impl EvaluationHarness for PanickyHarness {
        async fn evaluate(
            &self,
            _task: &Task,
            _patch: &Patch,
            _timeout: Duration,
        ) -> Result<EvaluationOutcome, HarnessError> {
            panic!("harness backend blew up");
        }
    }

    #[tokio::test]
    async fn test_run_batch_worker_panic_folds_to_infra() {
        let catalog = TaskCatalog::new(vec![task("t-1"), task("t-2")]);
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(PanickyHarness),
        );

        let run = runner.run(&catalog, fast_config()).await.unwrap();

        assert_eq!(run.jobs.len(), 2);
        for job in &run.jobs {
            assert!(job.is_done());
            assert_eq!(job.verdict(), Some(Verdict::Fail));
            assert_eq!(job.failure_kind(), Some(FailureKind::InfraError));
            assert!(job.error.as_deref().unwrap().contains("worker fault"));
        }
    }

    #[tokio::test]
    async fn test_run_batch_hung_harness_times_out() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let harness = FixtureHarness::new()
            .with_default(FixtureBehavior::Hang(Duration::from_secs(30)));
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(harness),
        );

        let config = fast_config().with_timeout_seconds(1);
        let run = runner.run(&catalog, config).await.unwrap();

        let job = &run.jobs[0];
        assert_eq!(job.verdict(), Some(Verdict::Fail));
        assert_eq!(job.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_run_batch_rejects_invalid_config() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(FixtureHarness::new()),
        );

        let config = BatchConfig::default().with_max_workers(0);
        let result = runner.run(&catalog, config).await;
        assert!(matches!(result, Err(ArbiterError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_batch_rejects_empty_selection() {
        let catalog = TaskCatalog::new(Vec::new());
        let runner = BatchRunner::new(
            Arc::new(StaticClient {
                reply: diff_reply(),
            }),
            Arc::new(FixtureHarness::new()),
        );

        let result = runner.run(&catalog, fast_config()).await;
        assert!(matches!(result, Err(ArbiterError::Config(_))));
    }

    #[test]
    fn test_select_tasks_by_ids_preserves_order() {
        let catalog = TaskCatalog::new(vec![task("t-1"), task("t-2"), task("t-3")]);
        let config = BatchConfig::default()
            .with_task_ids(vec!["t-3".to_string(), "t-1".to_string()]);

        let tasks = select_tasks(&catalog, &config).unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t-3", "t-1"]);
    }

    #[test]
    fn test_select_tasks_unknown_id_fails() {
        let catalog = TaskCatalog::new(vec![task("t-1")]);
        let config = BatchConfig::default().with_task_ids(vec!["t-404".to_string()]);
        assert!(select_tasks(&catalog, &config).is_err());
    }
}

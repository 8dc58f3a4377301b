//! CLI command definitions for swe_arbiter.
//!
//! Two subcommands cover the orchestrator surface: `evaluate` runs a batch
//! of bug-fix tasks against a participant endpoint and a harness backend,
//! `tasks` lists or inspects catalog contents without evaluating anything.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::{HttpParticipant, RetryPolicy};
use crate::catalog::{load_file, CatalogLoader, Dataset, Task, TaskCatalog};
use crate::harness::{CommandHarness, EvaluationHarness, FixtureHarness};
use crate::report::{render_text, BatchSummary};
use crate::scheduler::{BatchConfig, BatchRunner};
use crate::storage::ArtifactStore;

/// Default dataset variant.
const DEFAULT_DATASET: &str = "lite";

/// Default dataset split.
const DEFAULT_SPLIT: &str = "test";

/// Default output directory for patches, logs and reports.
const DEFAULT_OUT_DIR: &str = "./arbiter-out";

/// Default per-stage timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default harness grace period in seconds.
const DEFAULT_GRACE_SECS: u64 = 60;

/// Default worker cap.
const DEFAULT_MAX_WORKERS: usize = 4;

/// Default participant call attempts, including the first.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Rows shown in the text task listing before truncation.
const MAX_LISTED_TASKS: usize = 20;

/// Evaluation orchestrator for autonomous coding agents.
#[derive(Parser)]
#[command(name = "swe_arbiter")]
#[command(about = "Benchmark autonomous coding agents on SWE-bench bug-fix tasks")]
#[command(version)]
#[command(
    long_about = "swe_arbiter sends each selected bug-fix task to a participant agent endpoint, judges the returned patch with an evaluation harness, and reports one deterministic PASS/FAIL verdict per task.\n\nExample usage:\n  swe_arbiter evaluate --participant-url http://localhost:8080/agent --harness-cmd swebench-eval --sample-size 25 --seed 42"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate a participant agent over a batch of tasks.
    ///
    /// Each selected task is sent to the participant endpoint, the returned
    /// patch is judged by the evaluation harness, and exactly one PASS/FAIL
    /// verdict is recorded per task.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// List or inspect tasks from a catalog.
    #[command(alias = "ls")]
    Tasks(TasksArgs),
}

/// Arguments for the evaluate command.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Participant agent endpoint URL (can also be set via PARTICIPANT_URL env var).
    #[arg(short = 'u', long, env = "PARTICIPANT_URL")]
    pub participant_url: String,

    /// Dataset variant to evaluate (lite, verified, full).
    #[arg(short = 'd', long, default_value = DEFAULT_DATASET, env = "ARBITER_DATASET")]
    pub dataset: String,

    /// Dataset split to fetch.
    #[arg(long, default_value = DEFAULT_SPLIT)]
    pub split: String,

    /// Load tasks from a local YAML/JSON catalog file instead of HuggingFace.
    #[arg(long)]
    pub catalog_file: Option<String>,

    /// Comma-separated task ids to evaluate, in order.
    #[arg(short = 't', long, conflicts_with = "sample_size")]
    pub task_ids: Option<String>,

    /// Evaluate a random sample of this many tasks.
    #[arg(short = 'n', long)]
    pub sample_size: Option<usize>,

    /// Seed for the sample draw; the same seed always picks the same tasks.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-stage timeout in seconds. The participant call and the harness
    /// evaluation each get this budget.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "ARBITER_TIMEOUT_SECS")]
    pub timeout: u64,

    /// Extra seconds the harness may run beyond the timeout before a hung
    /// evaluation is abandoned.
    #[arg(long, default_value_t = DEFAULT_GRACE_SECS, env = "ARBITER_GRACE_SECS")]
    pub grace: u64,

    /// Maximum concurrent jobs.
    #[arg(short = 'w', long, default_value_t = DEFAULT_MAX_WORKERS, env = "ARBITER_MAX_WORKERS")]
    pub max_workers: usize,

    /// Participant call attempts per task, including the first.
    #[arg(long, default_value_t = DEFAULT_RETRY_ATTEMPTS, env = "ARBITER_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// Harness command invoked per evaluation, whitespace-separated
    /// (can also be set via HARNESS_CMD env var).
    #[arg(long, env = "HARNESS_CMD", conflicts_with = "fixture")]
    pub harness_cmd: Option<String>,

    /// Use the built-in fixture harness that scores every patched task as
    /// resolved. Useful for dry runs against a participant endpoint without
    /// a real test environment.
    #[arg(long)]
    pub fixture: bool,

    /// Output directory for patches, logs and reports.
    #[arg(short = 'o', long, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: String,

    /// Output the run summary as JSON instead of text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for the tasks command.
#[derive(Parser, Debug)]
pub struct TasksArgs {
    /// Dataset variant to list (lite, verified, full).
    #[arg(short = 'd', long, default_value = DEFAULT_DATASET, env = "ARBITER_DATASET")]
    pub dataset: String,

    /// Dataset split to fetch.
    #[arg(long, default_value = DEFAULT_SPLIT)]
    pub split: String,

    /// Load tasks from a local YAML/JSON catalog file instead of HuggingFace.
    #[arg(long)]
    pub catalog_file: Option<String>,

    /// Fetch at most this many instances.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Show full details for a single task id.
    #[arg(short = 't', long)]
    pub task_id: Option<String>,

    /// Output JSON instead of a text listing.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the swe_arbiter CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Evaluate(args) => {
            run_evaluate_command(args).await?;
        }
        Commands::Tasks(args) => {
            run_tasks_command(args).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Evaluate Command Implementation
// ============================================================================

/// Runs the evaluate command with the provided arguments.
async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let dataset: Dataset = args.dataset.parse()?;

    if args.harness_cmd.is_none() && !args.fixture {
        anyhow::bail!(
            "A harness backend is required.\n\
             Provide --harness-cmd <CMD> (or set HARNESS_CMD), or pass --fixture for a scripted dry run."
        );
    }

    let tasks = load_tasks(dataset, &args.split, args.catalog_file.as_deref(), None).await?;
    let catalog = TaskCatalog::new(tasks);
    if catalog.is_empty() {
        anyhow::bail!("No tasks available in the selected catalog");
    }

    let mut config = BatchConfig::default()
        .with_dataset(dataset)
        .with_timeout_seconds(args.timeout)
        .with_grace_seconds(args.grace)
        .with_max_workers(args.max_workers)
        .with_retry(RetryPolicy {
            max_attempts: args.retry_attempts,
            ..RetryPolicy::default()
        });
    if let Some(raw) = args.task_ids.as_deref() {
        config = config.with_task_ids(parse_task_id_filter(raw));
    }
    if let Some(size) = args.sample_size {
        config = config.with_sample_size(size);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let store = Arc::new(ArtifactStore::new(&args.out_dir));
    store.init().await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize artifact store at {}: {}",
            args.out_dir,
            e
        )
    })?;

    info!(endpoint = %args.participant_url, "Using participant endpoint");
    let client = Arc::new(HttpParticipant::new(
        &args.participant_url,
        Duration::from_secs(args.timeout),
    ));

    let harness: Arc<dyn EvaluationHarness> = match args.harness_cmd.as_deref() {
        Some(raw) => {
            let command = parse_command_line(raw);
            let work_dir = Path::new(&args.out_dir).join("runs");
            let harness = CommandHarness::new(command, work_dir)?.with_grace(args.grace);
            let version = harness.probe().await.map_err(|e| {
                anyhow::anyhow!(
                    "Harness probe failed: {}.\n\
                     Check that --harness-cmd (or the HARNESS_CMD env var) points at a runnable executable.",
                    e
                )
            })?;
            info!(version = %version, "Harness probe succeeded");
            Arc::new(harness)
        }
        None => {
            info!("Using the fixture harness; every patched task will be scored as resolved");
            Arc::new(FixtureHarness::new())
        }
    };

    let runner = BatchRunner::new(client, harness).with_artifacts(store.clone());
    let run = runner.run(&catalog, config).await?;

    let summary = BatchSummary::from_run(&run);
    let json_output = summary.to_json()?;

    let report_name = format!("run-{}.json", run.id);
    let report_uri = store
        .write_report(&report_name, &json_output)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write report {}: {}", report_name, e))?;
    info!(path = %report_uri, "Report written");

    if args.json {
        println!("{}", json_output);
        return Ok(());
    }

    print!("{}", render_text(&summary));
    println!("Full report: {}", report_uri);
    Ok(())
}

// ============================================================================
// Tasks Command Implementation
// ============================================================================

/// JSON output structure for the tasks listing.
#[derive(Debug, Clone, Serialize)]
struct TaskListOutput {
    status: String,
    source: String,
    total: usize,
    tasks: Vec<TaskListEntry>,
}

/// One row in the tasks listing.
#[derive(Debug, Clone, Serialize)]
struct TaskListEntry {
    task_id: String,
    repo: String,
    fail_to_pass: usize,
    pass_to_pass: usize,
}

/// Runs the tasks command with the provided arguments.
async fn run_tasks_command(args: TasksArgs) -> anyhow::Result<()> {
    let dataset: Dataset = args.dataset.parse()?;
    let source = match args.catalog_file.as_deref() {
        Some(path) => path.to_string(),
        None => dataset.hf_name().to_string(),
    };

    let tasks = load_tasks(
        dataset,
        &args.split,
        args.catalog_file.as_deref(),
        args.limit,
    )
    .await?;

    if tasks.is_empty() {
        warn!("No tasks found in catalog");
        if args.json {
            println!("{{\"status\":\"empty\",\"tasks\":0}}");
        } else {
            println!("No tasks found.");
        }
        return Ok(());
    }

    let catalog = TaskCatalog::new(tasks);

    if let Some(task_id) = args.task_id.as_deref() {
        let task = catalog.get(task_id)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(task)?);
        } else {
            print_task_detail(task);
        }
        return Ok(());
    }

    if args.json {
        let output = TaskListOutput {
            status: "success".to_string(),
            source,
            total: catalog.len(),
            tasks: catalog
                .tasks()
                .iter()
                .map(|task| TaskListEntry {
                    task_id: task.task_id.clone(),
                    repo: task.repo.clone(),
                    fail_to_pass: task.fail_to_pass.len(),
                    pass_to_pass: task.pass_to_pass.len(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Loaded {} tasks from {}", catalog.len(), source);
        for task in catalog.tasks().iter().take(MAX_LISTED_TASKS) {
            println!(
                "  {} ({}, {} f2p, {} p2p)",
                task.task_id,
                task.repo,
                task.fail_to_pass.len(),
                task.pass_to_pass.len()
            );
        }
        if catalog.len() > MAX_LISTED_TASKS {
            println!("  ... and {} more", catalog.len() - MAX_LISTED_TASKS);
        }
    }

    Ok(())
}

/// Print one task in full for inspection.
fn print_task_detail(task: &Task) {
    println!("{}", task.task_id);
    println!("  repo:        {}", task.repo);
    println!("  base commit: {}", task.short_base_commit());
    if let Some(version) = &task.version {
        println!("  version:     {}", version);
    }
    println!("  fail_to_pass ({}):", task.fail_to_pass.len());
    for test in &task.fail_to_pass {
        println!("    {}", test);
    }
    println!("  pass_to_pass ({}):", task.pass_to_pass.len());
    for test in &task.pass_to_pass {
        println!("    {}", test);
    }
    println!();
    println!("{}", task.problem_statement);
}

/// Load tasks from a local catalog file or the HuggingFace rows API.
async fn load_tasks(
    dataset: Dataset,
    split: &str,
    catalog_file: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<Vec<Task>> {
    match catalog_file {
        Some(path) => {
            let path = Path::new(path);
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Catalog file does not exist: {}",
                    path.display()
                ));
            }
            let mut tasks = load_file(path)?;
            if let Some(n) = limit {
                tasks.truncate(n);
            }
            info!(count = tasks.len(), path = %path.display(), "Loaded tasks from catalog file");
            Ok(tasks)
        }
        None => {
            info!(dataset = %dataset, split = split, "Fetching tasks from HuggingFace");
            let loader = CatalogLoader::with_split(dataset, split);
            let tasks = loader.fetch_all(limit).await?;
            info!(count = tasks.len(), "Fetched tasks");
            Ok(tasks)
        }
    }
}

/// Split a comma-separated task id list into ids.
fn parse_task_id_filter(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>()
}

/// Split a harness command line on whitespace. Shell quoting is not
/// interpreted.
fn parse_command_line(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

//! Catalog loading from HuggingFace and local files.
//!
//! The primary source is the HuggingFace datasets-server rows API, which
//! serves SWE-bench instances as paginated JSON without requiring a local
//! dataset checkout. Local YAML or JSON catalogs are supported for offline
//! runs and tests.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::task::{Dataset, Task};
use crate::error::CatalogError;

/// Default split to fetch from the dataset.
const DEFAULT_SPLIT: &str = "test";

/// Base URL for the HuggingFace datasets-server rows API.
const HUGGINGFACE_ROWS_API: &str = "https://datasets-server.huggingface.co/rows";

/// Configuration for the HuggingFace catalog loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Delay between page requests in milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Maximum rows per page request.
    pub page_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: 100,
            page_size: 100,
        }
    }
}

/// Loader for SWE-bench tasks from the HuggingFace rows API.
///
/// Each fetched instance carries the repository, pinned commit, problem
/// statement and the FAIL_TO_PASS / PASS_TO_PASS test sets the harness
/// later replays.
pub struct CatalogLoader {
    /// HTTP client for API requests.
    http_client: Client,
    /// Dataset variant to fetch.
    dataset: Dataset,
    /// Dataset split to fetch from.
    split: String,
    /// Loader configuration.
    config: LoaderConfig,
}

impl CatalogLoader {
    /// Create a loader for the given dataset variant with default settings.
    pub fn new(dataset: Dataset) -> Self {
        Self::with_split(dataset, DEFAULT_SPLIT)
    }

    /// Create a loader for a specific dataset variant and split.
    pub fn with_split(dataset: Dataset, split: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            dataset,
            split: split.into(),
            config: LoaderConfig::default(),
        }
    }

    /// Configure the loader with custom settings.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the dataset variant this loader targets.
    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    /// Get the current split.
    pub fn split(&self) -> &str {
        &self.split
    }

    /// Fetch a single page of tasks from the rows API.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::FetchFailed` on HTTP or decode failure and
    /// `CatalogError::RateLimited` when the server returns 429.
    pub async fn fetch_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Task>, CatalogError> {
        let effective_limit = limit.min(self.config.page_size);

        let url = format!(
            "{}?dataset={}&config=default&split={}&offset={}&length={}",
            HUGGINGFACE_ROWS_API,
            self.dataset.hf_name(),
            self.split,
            offset,
            effective_limit
        );

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CatalogError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(CatalogError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CatalogError::FetchFailed(format!(
                "API returned status {}: {}",
                status, error_text
            )));
        }

        let api_response: RowsResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::FetchFailed(format!("Failed to parse response: {}", e)))?;

        let tasks = api_response
            .rows
            .into_iter()
            .filter_map(|row| convert_row(row.row))
            .collect();

        Ok(tasks)
    }

    /// Fetch up to `limit` tasks, paginating until the dataset is exhausted.
    ///
    /// Pages are requested sequentially with a small delay between them to
    /// stay under the rows API rate limit. `None` fetches the whole split.
    pub async fn fetch_all(&self, limit: Option<usize>) -> Result<Vec<Task>, CatalogError> {
        let mut tasks = Vec::new();
        let mut offset = 0;

        loop {
            let remaining = match limit {
                Some(n) if tasks.len() >= n => break,
                Some(n) => n - tasks.len(),
                None => self.config.page_size,
            };

            let page = self.fetch_page(remaining, offset).await?;
            let page_len = page.len();
            debug!(offset, rows = page_len, "fetched catalog page");
            tasks.extend(page);

            if page_len < remaining.min(self.config.page_size) {
                break;
            }
            offset += page_len;

            tokio::time::sleep(Duration::from_millis(self.config.rate_limit_delay_ms)).await;
        }

        if let Some(n) = limit {
            tasks.truncate(n);
        }
        Ok(tasks)
    }
}

/// Load tasks from a local catalog file.
///
/// `.yaml` / `.yml` files are parsed as YAML, anything else as JSON. The
/// file may contain either a bare task array or a `{ "tasks": [...] }`
/// wrapper object.
pub fn load_file(path: &Path) -> Result<Vec<Task>, CatalogError> {
    let raw = std::fs::read_to_string(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let file: CatalogFile = if is_yaml {
        serde_yaml::from_str(&raw)?
    } else {
        serde_json::from_str(&raw)?
    };

    Ok(file.into_tasks())
}

/// On-disk catalog shapes accepted by [`load_file`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Bare(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

impl CatalogFile {
    fn into_tasks(self) -> Vec<Task> {
        match self {
            CatalogFile::Bare(tasks) => tasks,
            CatalogFile::Wrapped { tasks } => tasks,
        }
    }
}

/// Convert a HuggingFace row into a task, dropping rows that lack the
/// required fields.
fn convert_row(data: InstanceRow) -> Option<Task> {
    let task_id = data.instance_id?;
    let repo = data.repo?;
    let problem_statement = data.problem_statement.unwrap_or_default();

    if problem_statement.is_empty() {
        warn!(task_id = %task_id, "skipping instance with empty problem statement");
        return None;
    }

    let hints = data.hints_text.filter(|h| !h.trim().is_empty());

    Some(Task {
        task_id,
        repo,
        base_commit: data.base_commit,
        problem_statement,
        hints,
        fail_to_pass: parse_test_list(data.fail_to_pass.as_deref()),
        pass_to_pass: parse_test_list(data.pass_to_pass.as_deref()),
        version: data.version,
        environment_setup_commit: data.environment_setup_commit,
    })
}

/// Parse a test set column into a list of test identifiers.
///
/// The dataset stores FAIL_TO_PASS and PASS_TO_PASS as JSON-encoded string
/// arrays inside a string column. A value that is not valid JSON is taken
/// as a single bare test name.
fn parse_test_list(raw: Option<&str>) -> Vec<String> {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Vec::new(),
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tests) => tests,
        Err(_) => vec![raw.to_string()],
    }
}

/// Response structure from the HuggingFace rows API.
#[derive(Debug, Deserialize)]
struct RowsResponse {
    /// List of rows from the dataset.
    rows: Vec<RowEntry>,
}

/// A single row entry wrapping the instance fields.
#[derive(Debug, Deserialize)]
struct RowEntry {
    /// Row data containing the actual fields.
    row: InstanceRow,
}

/// Data fields for a SWE-bench instance.
#[derive(Debug, Default, Deserialize)]
struct InstanceRow {
    /// Unique instance identifier.
    instance_id: Option<String>,
    /// Repository in "owner/name" form.
    repo: Option<String>,
    /// Base commit SHA.
    base_commit: Option<String>,
    /// Problem statement shown to the agent.
    problem_statement: Option<String>,
    /// Hints text from the issue discussion.
    hints_text: Option<String>,
    /// Tests that should pass after applying the patch.
    #[serde(rename = "FAIL_TO_PASS")]
    fail_to_pass: Option<String>,
    /// Tests that should remain passing.
    #[serde(rename = "PASS_TO_PASS")]
    pass_to_pass: Option<String>,
    /// Version identifier.
    version: Option<String>,
    /// Environment setup commit.
    environment_setup_commit: Option<String>,
}

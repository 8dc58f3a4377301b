//! Error types for the swe-arbiter orchestrator.

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, ArbiterError>;

/// Top-level error type covering every stage of a batch run.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Task catalog failure.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Participant agent communication failure.
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Evaluation harness failure.
    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),

    /// Invalid batch configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading or querying the task catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Fetching rows from the dataset server failed.
    #[error("Dataset fetch failed: {0}")]
    FetchFailed(String),

    /// The dataset server asked us to back off.
    #[error("Rate limited by dataset server (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The requested dataset name is not a known SWE-bench variant.
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Lookup by task id found nothing.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A query asked for something the catalog cannot provide.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error while reading a local catalog file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error in a dataset response or local catalog.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error in a local catalog file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while talking to the participant agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Network-level request failure (connect, send, or read).
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The agent endpoint returned a non-success status code.
    #[error("Agent API error {code}: {message}")]
    ApiError { code: u16, message: String },

    /// The agent endpoint asked us to back off.
    #[error("Rate limited by agent (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The call did not complete within the configured deadline.
    #[error("Agent call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The agent answered with an empty body.
    #[error("Agent returned an empty reply")]
    EmptyReply,

    /// The agent answered with a body we could not decode.
    #[error("Unexpected reply shape: {0}")]
    UnexpectedReply(String),
}

/// Errors that can occur inside an evaluation harness backend.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The harness process could not be started.
    #[error("Failed to spawn harness: {0}")]
    SpawnFailed(String),

    /// The harness did not finish within the subprocess deadline.
    #[error("Harness timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The harness exited without producing a report.
    #[error("Harness produced no report: {0}")]
    MissingReport(String),

    /// The harness report could not be parsed.
    #[error("Malformed harness report: {0}")]
    ReportParse(String),

    /// IO error while staging harness inputs or reading outputs.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while decoding a harness report.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

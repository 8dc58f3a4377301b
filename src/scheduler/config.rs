//! Batch configuration for the evaluation scheduler.
//!
//! Holds the knobs a batch run needs: task selection, the per-job
//! timeout, worker count, and the retry policy for participant calls.
//! Validation is fail-fast so a bad run dies before any job is
//! dispatched.

use thiserror::Error;

use crate::agent::RetryPolicy;
use crate::catalog::Dataset;

/// Default per-job evaluation timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default seconds granted beyond the timeout before a job is abandoned.
const DEFAULT_GRACE_SECS: u64 = 60;

/// Default number of concurrent workers.
const DEFAULT_MAX_WORKERS: usize = 4;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for crate::error::ArbiterError {
    fn from(err: ConfigError) -> Self {
        crate::error::ArbiterError::Config(err.to_string())
    }
}

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Dataset the tasks come from, recorded in run metadata.
    pub dataset: Dataset,
    /// Explicit task ids to evaluate. Mutually exclusive with sampling.
    pub task_ids: Option<Vec<String>>,
    /// Number of tasks to sample from the catalog.
    pub sample_size: Option<usize>,
    /// Seed for reproducible sampling.
    pub seed: Option<u64>,
    /// Per-job timeout in seconds, applied to the participant call and
    /// to the evaluation.
    pub timeout_seconds: u64,
    /// Seconds allowed beyond the timeout before a job is abandoned.
    pub grace_seconds: u64,
    /// Maximum number of jobs in flight at once.
    pub max_workers: usize,
    /// Retry policy for participant calls.
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dataset: Dataset::Lite,
            task_ids: None,
            sample_size: None,
            seed: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            grace_seconds: DEFAULT_GRACE_SECS,
            max_workers: DEFAULT_MAX_WORKERS,
            retry: RetryPolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ARBITER_DATASET`: Dataset name (default: lite)
    /// - `ARBITER_TIMEOUT_SECS`: Per-job timeout in seconds (default: 600)
    /// - `ARBITER_GRACE_SECS`: Grace period in seconds (default: 60)
    /// - `ARBITER_MAX_WORKERS`: Concurrent workers (default: 4)
    /// - `ARBITER_RETRY_ATTEMPTS`: Participant call attempts (default: 3)
    /// - `ARBITER_RETRY_BASE_MS`: Base backoff delay in ms (default: 500)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ARBITER_DATASET") {
            config.dataset = val.parse().map_err(|e| ConfigError::InvalidValue {
                key: "ARBITER_DATASET".to_string(),
                message: format!("{}", e),
            })?;
        }

        if let Ok(val) = std::env::var("ARBITER_TIMEOUT_SECS") {
            config.timeout_seconds = parse_env_value(&val, "ARBITER_TIMEOUT_SECS")?;
        }

        if let Ok(val) = std::env::var("ARBITER_GRACE_SECS") {
            config.grace_seconds = parse_env_value(&val, "ARBITER_GRACE_SECS")?;
        }

        if let Ok(val) = std::env::var("ARBITER_MAX_WORKERS") {
            config.max_workers = parse_env_value(&val, "ARBITER_MAX_WORKERS")?;
        }

        if let Ok(val) = std::env::var("ARBITER_RETRY_ATTEMPTS") {
            config.retry.max_attempts = parse_env_value(&val, "ARBITER_RETRY_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("ARBITER_RETRY_BASE_MS") {
            let ms: u64 = parse_env_value(&val, "ARBITER_RETRY_BASE_MS")?;
            config.retry.base_delay = std::time::Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.sample_size == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "sample_size must be greater than 0".to_string(),
            ));
        }

        if let Some(ref ids) = self.task_ids {
            if ids.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "task_ids cannot be empty when provided".to_string(),
                ));
            }
        }

        if self.task_ids.is_some() && self.sample_size.is_some() {
            return Err(ConfigError::ValidationFailed(
                "task_ids and sample_size are mutually exclusive".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the dataset.
    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = dataset;
        self
    }

    /// Builder method to set explicit task ids.
    pub fn with_task_ids(mut self, ids: Vec<String>) -> Self {
        self.task_ids = Some(ids);
        self
    }

    /// Builder method to set the sample size.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = Some(size);
        self
    }

    /// Builder method to set the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder method to set the per-job timeout.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Builder method to set the grace period.
    pub fn with_grace_seconds(mut self, seconds: u64) -> Self {
        self.grace_seconds = seconds;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Builder method to set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

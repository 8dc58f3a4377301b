//! Retry strategy for participant calls.
//!
//! The policy is an explicit value owned by the scheduler and applied only
//! around the agent stage. Harness results are authoritative and never
//! retried. Only transient failures are retried; a permanent failure is
//! returned immediately so call counts stay auditable.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AgentError;

/// Bounded exponential backoff for the agent call stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one call and never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `operation`, retrying transient failures with backoff.
    ///
    /// The first attempt is immediate. Before retry `k` (1-based) the task
    /// sleeps `base_delay * 2^(k-1)`. A non-transient error is returned
    /// straight away; when the attempt budget runs out, the last transient
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.base_delay * (1 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient_error(&err) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient agent failure"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentError::RequestFailed("retry budget exhausted".to_string())))
    }
}

/// Classify an agent error as transient (worth retrying) or permanent.
pub fn is_transient_error(error: &AgentError) -> bool {
    match error {
        AgentError::RequestFailed(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("timeout") || msg.contains("timed out") || msg.contains("connection")
        }
        AgentError::RateLimited { .. } => true,
        AgentError::Timeout { .. } => true,
        AgentError::ApiError { code, .. } => *code >= 500 || *code == 429,
        AgentError::EmptyReply | AgentError::UnexpectedReply(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient_error(&AgentError::RequestFailed(
            "connection refused".to_string()
        )));
        assert!(is_transient_error(&AgentError::RequestFailed(
            "operation timed out".to_string()
        )));
        assert!(is_transient_error(&AgentError::RateLimited {
            retry_after: Some(2)
        }));
        assert!(is_transient_error(&AgentError::Timeout { seconds: 30 }));
        assert!(is_transient_error(&AgentError::ApiError {
            code: 503,
            message: "unavailable".to_string()
        }));
        assert!(is_transient_error(&AgentError::ApiError {
            code: 429,
            message: "slow down".to_string()
        }));
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!is_transient_error(&AgentError::RequestFailed(
            "invalid URL".to_string()
        )));
        assert!(!is_transient_error(&AgentError::ApiError {
            code: 404,
            message: "no such route".to_string()
        }));
        assert!(!is_transient_error(&AgentError::EmptyReply));
        assert!(!is_transient_error(&AgentError::UnexpectedReply(
            "{}".to_string()
        )));
    }

    #[tokio::test]
    async fn test_run_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast_policy(3)
            .run(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AgentError::RateLimited { retry_after: None })
                    } else {
                        Ok("reply")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "reply");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<&str, _> = fast_policy(5)
            .run(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AgentError::ApiError {
                        code: 400,
                        message: "bad request".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(AgentError::ApiError { code: 400, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exhausts_budget_and_returns_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<&str, _> = fast_policy(3)
            .run(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AgentError::Timeout { seconds: 1 })
                }
            })
            .await;

        assert!(matches!(result, Err(AgentError::Timeout { seconds: 1 })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_none_policy_makes_single_call() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<&str, _> = RetryPolicy::none()
            .run(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AgentError::RateLimited { retry_after: None })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

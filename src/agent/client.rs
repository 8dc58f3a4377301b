//! HTTP client for the participant agent endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::prompt::build_task_prompt;
use crate::catalog::Task;
use crate::error::AgentError;

/// Boundary to the participant agent.
///
/// Exactly one outbound call per `request` invocation; retry policy lives
/// with the caller so call counts stay auditable. Tests substitute a
/// scripted implementation.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    /// Send the task's prompt and return the raw reply text.
    async fn request(&self, task: &Task) -> Result<String, AgentError>;
}

/// Participant client speaking JSON over HTTP.
///
/// Posts `{id, message: {role, content, task_id}}` to the endpoint and
/// pulls the reply text out of the common response shapes. A plain-text
/// body is accepted as the reply itself.
pub struct HttpParticipant {
    /// HTTP client for participant requests.
    http_client: Client,
    /// Participant endpoint URL.
    endpoint: String,
    /// Per-call deadline enforced at the transport level.
    timeout: Duration,
}

impl HttpParticipant {
    /// Create a client for the given endpoint with a per-call timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// The endpoint this client targets.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> AgentError {
        if err.is_timeout() {
            AgentError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            AgentError::RequestFailed(err.to_string())
        }
    }
}

#[async_trait]
impl ParticipantClient for HttpParticipant {
    async fn request(&self, task: &Task) -> Result<String, AgentError> {
        let prompt = build_task_prompt(task);
        let request = AgentRequest {
            id: Uuid::new_v4().to_string(),
            message: OutboundMessage {
                role: "user",
                content: &prompt,
                task_id: &task.task_id,
            },
        };

        debug!(task_id = %task.task_id, endpoint = %self.endpoint, "sending task to participant");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(AgentError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let reply = extract_reply_text(&body)?;
        if reply.trim().is_empty() {
            return Err(AgentError::EmptyReply);
        }
        Ok(reply)
    }
}

/// Outbound request body.
#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    /// Correlation id for this call.
    id: String,
    /// The task message.
    message: OutboundMessage<'a>,
}

/// The message wrapper carrying the prompt.
#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    role: &'static str,
    content: &'a str,
    task_id: &'a str,
}

/// Pull the reply text out of a response body.
///
/// Accepted shapes, in order: `{"message": {"content": ...}}`,
/// `{"content": ...}`, `{"text": ...}`, a bare JSON string, or a
/// non-JSON body taken verbatim. A JSON object with none of the text
/// fields is a protocol violation.
fn extract_reply_text(body: &str) -> Result<String, AgentError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Ok(body.to_string()),
    };

    if let Some(text) = value.as_str() {
        return Ok(text.to_string());
    }

    let text = value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .or_else(|| value.get("content").and_then(Value::as_str))
        .or_else(|| value.get("text").and_then(Value::as_str));

    match text {
        Some(text) => Ok(text.to_string()),
        None => {
            let preview: String = body.chars().take(120).collect();
            Err(AgentError::UnexpectedReply(preview))
        }
    }
}

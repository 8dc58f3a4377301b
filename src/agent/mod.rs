//! Participant agent boundary: prompt construction, the HTTP client, and
//! the retry strategy applied around it.

pub mod client;
pub mod prompt;
pub mod retry;

pub use client::{HttpParticipant, ParticipantClient};
pub use prompt::build_task_prompt;
pub use retry::{is_transient_error, RetryPolicy};

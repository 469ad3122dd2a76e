use relay_core::BackoffPolicy;
use tracing::{info, warn};

use crate::backend::AgentBackend;
use crate::error::BackendError;
use crate::message::{AgentMessage, MessageContent};

/// Attempt budget and delay schedule for one upstream call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffPolicy::upstream())
    }
}

/// Send `content`, retrying timeouts, transport errors and 5xx responses.
///
/// A 4xx or malformed response ends the call immediately. After the last
/// attempt the final error is returned.
pub async fn send_with_retry(
    backend: &dyn AgentBackend,
    content: &MessageContent,
    policy: &RetryPolicy,
) -> Result<Vec<AgentMessage>, BackendError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match backend.send(content).await {
            Ok(messages) => {
                if attempt > 1 {
                    info!(backend = %backend.name(), attempt, "request succeeded after retry");
                }
                return Ok(messages);
            }
            Err(e) if !e.is_retryable() => {
                warn!(backend = %backend.name(), attempt, error = %e, "request failed, not retrying");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    backend = %backend.name(),
                    attempts = attempt,
                    error = %e,
                    "request failed, retries exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let wait = policy.backoff.delay(attempt);
                warn!(
                    backend = %backend.name(),
                    attempt,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

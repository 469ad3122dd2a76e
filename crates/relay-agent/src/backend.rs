use async_trait::async_trait;

use crate::error::BackendError;
use crate::message::{AgentMessage, MessageContent};

/// An agent that accepts one user message and answers with a typed list.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Send one user message, wait for the full response list.
    async fn send(&self, content: &MessageContent) -> Result<Vec<AgentMessage>, BackendError>;
}

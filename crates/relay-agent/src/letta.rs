use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::AgentBackend;
use crate::error::BackendError;
use crate::message::{AgentMessage, MessageContent};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for one Letta agent.
pub struct LettaClient {
    client: reqwest::Client,
    base_url: String,
    agent_id: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a MessageContent,
}

impl LettaClient {
    /// Build a client with its own connection pool and the given timeouts.
    pub fn new(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url, agent_id))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/agents/{}/messages", self.base_url, self.agent_id)
    }
}

#[async_trait]
impl AgentBackend for LettaClient {
    fn name(&self) -> &str {
        "letta"
    }

    async fn send(&self, content: &MessageContent) -> Result<Vec<AgentMessage>, BackendError> {
        let body = SendRequest {
            messages: [UserMessage {
                role: "user",
                content,
            }],
        };

        debug!(
            agent = %self.agent_id,
            chars = content.text_len(),
            images = content.image_count(),
            "sending message to Letta"
        );

        let resp = self.client.post(self.messages_url()).json(&body).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(agent = %self.agent_id, status, body = %text, "Letta API error");
            return Err(BackendError::from_status(status, text));
        }

        let raw = resp.text().await?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| BackendError::Parse(e.to_string()))?;
        parse_messages(value)
    }
}

/// Accept either `{"messages": [...]}` or a bare array.
pub fn parse_messages(value: Value) -> Result<Vec<AgentMessage>, BackendError> {
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(BackendError::Parse(format!(
                    "`messages` is not an array: {other}"
                )))
            }
            None => Vec::new(),
        },
        other => {
            return Err(BackendError::Parse(format!(
                "unexpected response shape: {other}"
            )))
        }
    };
    Ok(entries.into_iter().map(AgentMessage::from_value).collect())
}

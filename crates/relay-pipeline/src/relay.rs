use std::sync::Arc;

use async_trait::async_trait;
use relay_agent::{extract_reply, send_with_retry, AgentBackend, MessageContent, RetryPolicy};
use relay_channels::{send_chunked_reply, ChatChannel, ChunkOptions};
use tracing::{error, info, warn};

use crate::attach::{AttachmentPipeline, DownloadedAttachment};
use crate::debounce::{Batch, BatchSink};

/// Upstream caller: turns a flushed batch into one agent request and sends
/// the agent's reply back to the channel.
pub struct Relay {
    identity: String,
    backend: Arc<dyn AgentBackend>,
    channel: Arc<dyn ChatChannel>,
    attachments: AttachmentPipeline,
    retry: RetryPolicy,
    chunking: ChunkOptions,
}

impl Relay {
    pub fn new(
        identity: impl Into<String>,
        backend: Arc<dyn AgentBackend>,
        channel: Arc<dyn ChatChannel>,
        attachments: AttachmentPipeline,
    ) -> Self {
        Self {
            identity: identity.into(),
            backend,
            channel,
            attachments,
            retry: RetryPolicy::default(),
            chunking: ChunkOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkOptions) -> Self {
        self.chunking = chunking;
        self
    }

    /// Send one batch upstream and relay the reply. Returns whether a reply
    /// reached the channel.
    pub async fn send(&self, batch: &Batch) -> bool {
        let downloaded = self.attachments.process(&batch.attachments).await;
        let content = build_content(&batch.text, &downloaded);

        info!(
            bot = %self.identity,
            channel_id = %batch.channel_id,
            chars = content.text_len(),
            images = content.image_count(),
            "calling agent"
        );

        let messages = match send_with_retry(self.backend.as_ref(), &content, &self.retry).await {
            Ok(m) => m,
            Err(e) => {
                error!(bot = %self.identity, channel_id = %batch.channel_id, error = %e, "agent call failed, batch dropped");
                return false;
            }
        };

        let Some(reply) = extract_reply(&messages) else {
            info!(bot = %self.identity, entries = messages.len(), "no actionable reply");
            return false;
        };

        let files = self.attachments.fetch_reply_images(&reply).await;
        match send_chunked_reply(
            self.channel.as_ref(),
            &batch.reply_to,
            &reply,
            &files,
            &self.chunking,
        )
        .await
        {
            Ok(0) => {
                info!(bot = %self.identity, "agent reply was empty");
                false
            }
            Ok(chunks) => {
                info!(
                    bot = %self.identity,
                    channel_id = %batch.channel_id,
                    chunks,
                    files = files.len(),
                    chars = reply.chars().count(),
                    "reply sent"
                );
                true
            }
            Err(e) => {
                warn!(bot = %self.identity, channel_id = %batch.channel_id, error = %e, "failed to send reply");
                false
            }
        }
    }
}

#[async_trait]
impl BatchSink for Relay {
    async fn deliver(&self, batch: Batch) {
        self.send(&batch).await;
    }
}

/// Batch text plus one note per non-image or failed attachment, with every
/// usable image as its own block.
pub fn build_content(text: &str, attachments: &[DownloadedAttachment]) -> MessageContent {
    let mut body = text.to_string();
    for note in attachments.iter().filter_map(DownloadedAttachment::note) {
        body.push('\n');
        body.push_str(&note);
    }
    let images = attachments
        .iter()
        .filter_map(DownloadedAttachment::image_source)
        .collect();
    MessageContent::with_images(body, images)
}

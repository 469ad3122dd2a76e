use std::sync::Arc;

use async_trait::async_trait;
use relay_channels::{ChannelError, ChatChannel, InboundEvent, OutboundFile};
use serenity::builder::{CreateAttachment, CreateMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};

/// Discord REST side of [`ChatChannel`].
///
/// Uses `Arc<Http>` rather than the gateway, so it stays valid across
/// reconnects.
pub struct DiscordOutbound {
    http: Arc<Http>,
}

impl DiscordOutbound {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn parse_id(raw: &str) -> Result<u64, ChannelError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| ChannelError::InvalidTarget(raw.to_string()))
}

#[async_trait]
impl ChatChannel for DiscordOutbound {
    fn name(&self) -> &str {
        "discord"
    }

    async fn reply(
        &self,
        to: &InboundEvent,
        text: &str,
        files: &[OutboundFile],
    ) -> Result<(), ChannelError> {
        let channel_id = ChannelId::new(parse_id(&to.channel_id)?);
        let message_id = MessageId::new(parse_id(&to.id)?);

        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel_id, message_id))
            .add_files(
                files
                    .iter()
                    .map(|f| CreateAttachment::bytes(f.data.clone(), f.filename.clone())),
            );

        channel_id
            .send_message(&self.http, builder)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        ChannelId::new(parse_id(channel_id)?)
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

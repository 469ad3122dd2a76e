use std::sync::{Arc, OnceLock};

use relay_channels::{AttachmentRef, InboundEvent};
use relay_pipeline::{DebounceAggregator, DedupLedger};
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info};

/// Text used when a message is nothing but mentions.
pub const EMPTY_MESSAGE_FALLBACK: &str = "hi";

/// Serenity event handler feeding the relay pipeline.
///
/// Cheap to clone; a fresh copy is handed to every rebuilt client.
#[derive(Clone)]
pub struct RelayHandler {
    identity: String,
    dedup: Arc<DedupLedger>,
    aggregator: DebounceAggregator,
    bot_id: Arc<OnceLock<UserId>>,
}

impl RelayHandler {
    pub fn new(identity: impl Into<String>, dedup: Arc<DedupLedger>, aggregator: DebounceAggregator) -> Self {
        Self {
            identity: identity.into(),
            dedup,
            aggregator,
            bot_id: Arc::new(OnceLock::new()),
        }
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        info!(
            bot = %self.identity,
            user = %ready.user.name,
            pid = std::process::id(),
            debounce_ms = self.aggregator.delay().as_millis() as u64,
            "Discord bot ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let own_id = match self.bot_id.get() {
            Some(id) => *id,
            None => ctx.cache.current_user().id,
        };
        if msg.author.id == own_id {
            return;
        }
        if self.dedup.seen_and_mark(&msg.id.to_string()) {
            debug!(bot = %self.identity, message_id = %msg.id, "duplicate message skipped");
            return;
        }

        let mention_ids: Vec<u64> = msg.mentions.iter().map(|u| u.id.get()).collect();
        let text = strip_mentions(&msg.content, &mention_ids);

        let author = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.display_name().to_string());

        let attachments = msg
            .attachments
            .iter()
            .map(|a| AttachmentRef {
                url: a.url.clone(),
                filename: a.filename.clone(),
                size: Some(u64::from(a.size)),
                content_type: a.content_type.clone(),
            })
            .collect();

        info!(
            bot = %self.identity,
            message_id = %msg.id,
            channel_id = %msg.channel_id,
            preview = %text.chars().take(50).collect::<String>(),
            "message received"
        );

        let event = InboundEvent::new(msg.id.to_string(), msg.channel_id.to_string(), author, text)
            .with_attachments(attachments);
        self.aggregator.on_event(event);
    }
}

/// Remove `<@id>` and `<@!id>` markup for every mentioned user. A message
/// left empty becomes [`EMPTY_MESSAGE_FALLBACK`].
pub fn strip_mentions(content: &str, mention_ids: &[u64]) -> String {
    let mut text = content.to_string();
    for id in mention_ids {
        text = text
            .replace(&format!("<@{id}>"), "")
            .replace(&format!("<@!{id}>"), "");
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        EMPTY_MESSAGE_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

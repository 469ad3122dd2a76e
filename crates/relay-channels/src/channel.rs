use async_trait::async_trait;

use crate::{
    error::ChannelError,
    types::{InboundEvent, OutboundFile},
};

/// Outbound half of a chat platform.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by every in-flight batch of a bot process.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Stable lowercase identifier for this platform (e.g. `"discord"`).
    fn name(&self) -> &str;

    /// Reply to `to`, threaded to the originating message, with optional files.
    async fn reply(
        &self,
        to: &InboundEvent,
        text: &str,
        files: &[OutboundFile],
    ) -> Result<(), ChannelError>;

    /// Post a plain follow-up message on `channel_id`.
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError>;
}

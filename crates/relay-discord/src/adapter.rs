use std::time::Duration;

use serenity::gateway::GatewayError;
use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use crate::error::DiscordError;
use crate::handler::RelayHandler;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const BUILD_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Discord channel adapter.
///
/// Wraps a serenity `Client` and drives the event loop, rebuilding the client
/// whenever the gateway drops.
pub struct DiscordAdapter {
    token: String,
    handler: RelayHandler,
}

impl DiscordAdapter {
    pub fn new(token: impl Into<String>, handler: RelayHandler) -> Self {
        Self {
            token: token.into(),
            handler,
        }
    }

    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    /// Connect and keep reconnecting. Only returns when Discord rejects the
    /// token, since no amount of retrying fixes that.
    pub async fn run(self) -> Result<(), DiscordError> {
        loop {
            let mut client = self.build_client_with_retry().await;

            info!("Discord: gateway connecting");
            match client.start().await {
                Err(e) if is_auth_failure(&e) => {
                    error!(error = %e, "Discord: authentication failed");
                    return Err(DiscordError::InvalidToken);
                }
                Err(e) => warn!(error = %e, "Discord: gateway error, reconnecting in 5s"),
                Ok(()) => info!("Discord: gateway stopped cleanly, reconnecting in 5s"),
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn build_client_with_retry(&self) -> Client {
        loop {
            match self.build_client().await {
                Ok(c) => return c,
                Err(e) => {
                    error!(error = %e, "Discord: client build failed, retrying in 30s");
                    tokio::time::sleep(BUILD_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn build_client(&self) -> Result<Client, serenity::Error> {
        Client::builder(&self.token, Self::intents())
            .event_handler(self.handler.clone())
            .await
    }
}

fn is_auth_failure(e: &serenity::Error) -> bool {
    matches!(
        e,
        serenity::Error::Gateway(GatewayError::InvalidAuthentication)
    )
}

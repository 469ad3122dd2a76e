//! `relay bot <identity>`: one Discord bot wired to one Letta agent.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use relay_agent::{LettaClient, RetryPolicy};
use relay_channels::ChunkOptions;
use relay_core::{BackoffPolicy, ConfigSource, RelaySettings};
use relay_discord::{DiscordAdapter, DiscordError, DiscordOutbound, RelayHandler};
use relay_pipeline::{
    AttachmentPipeline, ContentStore, DebounceAggregator, DedupLedger, InstanceLock, Relay,
};
use serenity::http::Http;
use tracing::{error, info};

use crate::shutdown;

const SEEN_FILE: &str = "seen.txt";

pub async fn run(identity: &str, settings: &RelaySettings) -> anyhow::Result<ExitCode> {
    let p = &settings.pipeline;
    let source = ConfigSource::from_env();
    let config = source
        .load()
        .await
        .with_context(|| format!("loading bots config from {source}"))?;
    let bot = config.bot(identity)?.clone();

    let bot_dir = p.bot_dir(identity);
    let Some(_lock) = InstanceLock::acquire(&bot_dir)? else {
        info!(bot = %identity, dir = %bot_dir.display(), "bot already running, exiting");
        return Ok(ExitCode::SUCCESS);
    };

    let dedup = Arc::new(DedupLedger::open(bot_dir.join(SEEN_FILE), p.dedup_capacity)?);
    info!(bot = %identity, seen = dedup.len(), "dedup ledger loaded");

    let letta = LettaClient::new(
        &config.letta_url,
        &bot.agent_id,
        Duration::from_secs(p.request_timeout_secs),
        Duration::from_secs(p.connect_timeout_secs),
    )?;

    let http = Arc::new(Http::new(&bot.discord_token));
    let outbound = Arc::new(DiscordOutbound::new(http));

    let download_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(p.request_timeout_secs))
        .connect_timeout(Duration::from_secs(p.connect_timeout_secs))
        .build()?;
    let attachments = AttachmentPipeline::new(
        download_client,
        ContentStore::new(p.attachment_store()),
        p.max_attachment_bytes,
        bot.enable_attachments,
    );

    let retry = RetryPolicy::new(
        p.letta_max_retries.max(1),
        BackoffPolicy::new(Duration::from_millis(p.letta_retry_base_ms), 2.0),
    );
    let chunking = ChunkOptions {
        max_paragraphs: p.chunk_max_paragraphs,
        max_chars: p.chunk_max_chars,
        delay: p.chunk_delay(),
    };
    let relay = Relay::new(identity, Arc::new(letta), outbound, attachments)
        .with_retry(retry)
        .with_chunking(chunking);

    let aggregator = DebounceAggregator::new("Discord", p.debounce(), Arc::new(relay));
    let handler = RelayHandler::new(identity, dedup, aggregator);
    let adapter = DiscordAdapter::new(bot.discord_token.clone(), handler);

    info!(
        bot = %identity,
        agent_id = %bot.agent_id,
        letta_url = %config.letta_url,
        attachments = bot.enable_attachments,
        "starting bot"
    );

    let signal = shutdown::install_signal_handler();
    tokio::select! {
        res = adapter.run() => match res {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(DiscordError::InvalidToken) => {
                error!(bot = %identity, "invalid Discord token, check the bot configuration");
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e.into()),
        },
        _ = shutdown::wait(signal) => {
            info!(bot = %identity, "bot stopped");
            Ok(ExitCode::SUCCESS)
        }
    }
}

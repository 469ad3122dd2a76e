use std::process::ExitCode;

use clap::{Parser, Subcommand};
use relay_core::RelaySettings;
use tokio::runtime::{Builder, Runtime};

mod bot;
mod check;
mod shutdown;
mod supervise;

const DEFAULT_LOG_FILTER: &str = "relay=info,relay_core=info,relay_channels=info,relay_agent=info,\
relay_pipeline=info,relay_discord=info,relay_supervisor=info,serenity=warn";

/// Discord ⇄ Letta relay bots and their supervisor.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single bot identity in the foreground.
    Bot {
        /// Key under `bots` in the configuration document.
        identity: String,
    },
    /// Run one bot process per configured identity and keep them alive.
    Supervise,
    /// Validate the configuration document and exit.
    CheckConfig,
}

/// Bot processes run every serenity event task on one thread, so tasks run
/// in the order the gateway spawned them and a channel's messages reach the
/// debounce buffer in arrival order.
fn runtime_for(command: &Command) -> std::io::Result<Runtime> {
    let mut builder = match command {
        Command::Bot { .. } => Builder::new_current_thread(),
        Command::Supervise | Command::CheckConfig => Builder::new_multi_thread(),
    };
    builder.enable_all().build()
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let settings = RelaySettings::load()?;
    let runtime = runtime_for(&cli.command)?;

    runtime.block_on(async {
        match cli.command {
            Command::Bot { identity } => bot::run(&identity, &settings).await,
            Command::Supervise => supervise::run(&settings).await,
            Command::CheckConfig => Ok(check::run().await),
        }
    })
}

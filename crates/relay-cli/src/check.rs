//! `relay check-config`: human-readable validation report.

use std::process::ExitCode;

use relay_core::{BotsConfig, ConfigSource};

pub async fn run() -> ExitCode {
    let source = ConfigSource::from_env();
    match source.load().await {
        Ok(config) => {
            print!("{}", report(&source, &config));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("✗ {source}");
            println!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn report(source: &ConfigSource, config: &BotsConfig) -> String {
    let mut out = format!(
        "✓ {source}: {} bot(s), letta_url {}\n",
        config.bots.len(),
        config.letta_url
    );
    for (name, bot) in &config.bots {
        let attachments = if bot.enable_attachments { "on" } else { "off" };
        out.push_str(&format!(
            "  - {name}: agent {} (attachments {attachments})\n",
            bot.agent_id
        ));
    }
    out
}

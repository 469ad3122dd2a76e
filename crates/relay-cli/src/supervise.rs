use std::process::ExitCode;
use std::sync::Arc;

use relay_core::{ConfigSource, RelaySettings};
use relay_supervisor::{BotSupervisor, ExeLauncher, SupervisorPolicy};

use crate::shutdown;

pub async fn run(settings: &RelaySettings) -> anyhow::Result<ExitCode> {
    let source = ConfigSource::from_env();
    let policy = SupervisorPolicy::from(&settings.supervisor);
    let launcher = ExeLauncher::current()?;

    let supervisor = BotSupervisor::new(policy, Arc::new(launcher));
    supervisor
        .run(source, shutdown::install_signal_handler())
        .await;
    Ok(ExitCode::SUCCESS)
}

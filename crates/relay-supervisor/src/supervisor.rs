//! `BotSupervisor`: one child process per bot identity.
//!
//! Poll-based: every `poll_interval` the supervisor reloads the bots
//! document, reconciles the process set against it, reaps exited children
//! and applies the stability reset. Children talk to the supervisor only
//! through their exit status and their captured stdout/stderr.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{BackoffPolicy, BotConfig, BotsConfig, ConfigSource, SupervisorSettings};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SupervisorError};
use crate::launcher::Launcher;
use crate::output::{drain, Origin, ProcessHealth};
use crate::types::{BotStatus, Phase, StartOutcome};

/// How long to wait for output drains to hit EOF after a child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Timing and retry budget for the supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorPolicy {
    pub poll_interval: Duration,
    pub max_restart_attempts: u32,
    pub backoff: BackoffPolicy,
    pub stability_window: Duration,
    pub stop_timeout: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::from(&SupervisorSettings::default())
    }
}

impl From<&SupervisorSettings> for SupervisorPolicy {
    fn from(s: &SupervisorSettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(s.poll_interval.max(1)),
            max_restart_attempts: s.max_restart_attempts,
            backoff: BackoffPolicy::restart(s.restart_backoff_base),
            stability_window: Duration::from_secs(s.stability_window),
            stop_timeout: Duration::from_secs(s.stop_timeout),
        }
    }
}

/// The part of the bots document a child depends on. A change restarts it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Desired {
    letta_url: String,
    bot: BotConfig,
}

struct BotProcess {
    child: Option<Child>,
    drains: Vec<JoinHandle<()>>,
    restart_count: u32,
    last_restart_at: Option<Instant>,
    health: Arc<ProcessHealth>,
    phase: Phase,
    desired: Option<Desired>,
}

impl BotProcess {
    fn new(desired: Option<Desired>) -> Self {
        Self {
            child: None,
            drains: Vec::new(),
            restart_count: 0,
            last_restart_at: None,
            health: Arc::new(ProcessHealth::default()),
            phase: Phase::Backoff,
            desired,
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

pub struct BotSupervisor {
    policy: SupervisorPolicy,
    launcher: Arc<dyn Launcher>,
    processes: BTreeMap<String, BotProcess>,
}

impl BotSupervisor {
    pub fn new(policy: SupervisorPolicy, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            policy,
            launcher,
            processes: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the bot process for `name`, subject to the restart budget and
    /// the backoff window since the previous spawn.
    pub fn start(&mut self, name: &str) -> StartOutcome {
        let entry = self
            .processes
            .entry(name.to_string())
            .or_insert_with(|| BotProcess::new(None));

        if entry.child.is_some() {
            return StartOutcome::AlreadyRunning;
        }

        if entry.restart_count >= self.policy.max_restart_attempts {
            if entry.phase != Phase::Abandoned {
                let last_error = entry.health.last_error();
                error!(
                    bot = %name,
                    restart_count = entry.restart_count,
                    last_error = last_error.as_deref().unwrap_or("none"),
                    "max restart attempts reached, giving up"
                );
                entry.phase = Phase::Abandoned;
            }
            return StartOutcome::Abandoned;
        }

        if let Some(last) = entry.last_restart_at {
            let wait = self.policy.backoff.delay(entry.restart_count);
            let elapsed = last.elapsed();
            if elapsed < wait {
                let remaining = wait - elapsed;
                debug!(bot = %name, remaining_ms = remaining.as_millis() as u64, "in restart backoff");
                entry.phase = Phase::Backoff;
                return StartOutcome::InBackoff { remaining };
            }
        }

        entry.last_restart_at = Some(Instant::now());
        entry.health.reset();
        match spawn_bot(self.launcher.as_ref(), name, &entry.health) {
            Ok((child, drains)) => {
                let pid = child.id();
                entry.child = Some(child);
                entry.drains = drains;
                entry.phase = Phase::Running;
                info!(bot = %name, pid = ?pid, restart_count = entry.restart_count, "bot process started");
                StartOutcome::Started { pid }
            }
            Err(e) => {
                error!(bot = %name, error = %e, "bot process failed to start");
                let reason = e.to_string();
                entry.health.mark_unhealthy(reason.clone());
                entry.restart_count += 1;
                entry.phase = Phase::Backoff;
                StartOutcome::Failed(reason)
            }
        }
    }

    /// Reap exited children. A clean exit drops the identity; anything else
    /// counts as a crash and is restarted through [`start`](Self::start).
    /// Identities waiting out a backoff window are retried here too.
    pub async fn check_health(&mut self) {
        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names {
            let Some(entry) = self.processes.get_mut(&name) else {
                continue;
            };

            match entry.child.as_mut().map(Child::try_wait) {
                Some(Ok(None)) => continue,
                Some(Ok(Some(status))) => {
                    entry.child = None;
                    join_drains(&mut entry.drains).await;
                    if status.success() {
                        info!(bot = %name, "bot process exited cleanly, not restarting");
                        self.processes.remove(&name);
                        continue;
                    }
                    entry.restart_count += 1;
                    entry.phase = Phase::Backoff;
                    let last_error = entry.health.last_error();
                    warn!(
                        bot = %name,
                        %status,
                        restart_count = entry.restart_count,
                        last_error = last_error.as_deref().unwrap_or("none"),
                        "bot process crashed"
                    );
                }
                Some(Err(e)) => {
                    warn!(bot = %name, error = %e, "failed to poll bot process");
                    continue;
                }
                None => {
                    if entry.phase == Phase::Abandoned {
                        continue;
                    }
                }
            }

            self.start(&name);
        }
    }

    /// Zero the restart counter of every identity that has been running
    /// healthy for at least the stability window since its last spawn.
    pub fn apply_stability_reset(&mut self) {
        let window = self.policy.stability_window;
        for (name, entry) in self.processes.iter_mut() {
            if entry.phase != Phase::Running || entry.restart_count == 0 {
                continue;
            }
            if !entry.health.is_healthy() {
                continue;
            }
            if entry.last_restart_at.is_some_and(|t| t.elapsed() >= window) {
                info!(bot = %name, previous = entry.restart_count, "bot stable, restart count reset");
                entry.restart_count = 0;
            }
        }
    }

    /// Stop and forget one identity: SIGTERM, then SIGKILL after the stop
    /// timeout.
    pub async fn stop(&mut self, name: &str) {
        let Some(mut entry) = self.processes.remove(name) else {
            return;
        };
        for handle in entry.drains.drain(..) {
            handle.abort();
        }
        let Some(mut child) = entry.child.take() else {
            debug!(bot = %name, "stopped (no live process)");
            return;
        };
        if let Err(e) = terminate(&mut child, self.policy.stop_timeout).await {
            warn!(bot = %name, error = %e, "error while stopping bot process");
        }
        info!(bot = %name, "bot process stopped");
    }

    pub async fn stop_all(&mut self) {
        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names {
            self.stop(&name).await;
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Make the tracked set match `config`, then reap and reset.
    pub async fn sync(&mut self, config: &BotsConfig) {
        let stale: Vec<String> = self
            .processes
            .keys()
            .filter(|name| !config.bots.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            info!(bot = %name, "bot removed from config, stopping");
            self.stop(&name).await;
        }

        for (name, bot) in &config.bots {
            let want = Desired {
                letta_url: config.letta_url.clone(),
                bot: bot.clone(),
            };
            let current = self.processes.get(name).map(|e| e.desired.clone());
            match current {
                Some(Some(have)) if have == want => {}
                Some(None) => {
                    if let Some(entry) = self.processes.get_mut(name) {
                        entry.desired = Some(want);
                    }
                }
                Some(Some(_)) => {
                    info!(bot = %name, "bot config changed, restarting");
                    self.stop(name).await;
                    self.track_and_start(name, want);
                }
                None => {
                    info!(bot = %name, "starting bot");
                    self.track_and_start(name, want);
                }
            }
        }

        self.check_health().await;
        self.apply_stability_reset();
    }

    fn track_and_start(&mut self, name: &str, want: Desired) {
        self.processes
            .insert(name.to_string(), BotProcess::new(Some(want)));
        self.start(name);
    }

    /// One supervision cycle: reload, reconcile, reap, reset.
    pub async fn poll(&mut self, source: &ConfigSource) {
        match source.load().await {
            Ok(config) => self.sync(&config).await,
            Err(e) => {
                error!(
                    source = %source,
                    error = %e,
                    "failed to load bots config, keeping current processes"
                );
                self.check_health().await;
                self.apply_stability_reset();
            }
        }
    }

    /// Per-identity snapshots, ordered by name.
    pub fn status(&self) -> Vec<BotStatus> {
        self.processes
            .iter()
            .map(|(name, entry)| BotStatus {
                name: name.clone(),
                phase: entry.phase,
                healthy: entry.health.is_healthy(),
                restart_count: entry.restart_count,
                last_error: entry.health.last_error(),
                pid: entry.pid(),
            })
            .collect()
    }

    /// Main loop. Polls every `poll_interval` until `shutdown` broadcasts
    /// `true`, then stops every child.
    pub async fn run(mut self, source: ConfigSource, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = %source,
            poll_secs = self.policy.poll_interval.as_secs(),
            max_restarts = self.policy.max_restart_attempts,
            "supervisor started"
        );

        let mut interval = tokio::time::interval(self.policy.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_status: Option<Vec<BotStatus>> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll(&source).await;
                    let status = self.status();
                    if last_status.as_ref() != Some(&status) {
                        log_status(&status);
                        last_status = Some(status);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("supervisor shutting down");
                        break;
                    }
                }
            }
        }

        self.stop_all().await;
        info!("all bot processes stopped");
    }
}

fn log_status(status: &[BotStatus]) {
    if status.is_empty() {
        info!("no bots running");
        return;
    }
    for s in status {
        info!(
            bot = %s.name,
            phase = %s.phase,
            healthy = s.healthy,
            restart_count = s.restart_count,
            pid = ?s.pid,
            last_error = s.last_error.as_deref().unwrap_or("none"),
            "bot status"
        );
    }
}

fn spawn_bot(
    launcher: &dyn Launcher,
    name: &str,
    health: &Arc<ProcessHealth>,
) -> Result<(Child, Vec<JoinHandle<()>>)> {
    let mut cmd = launcher.command(name);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        name: name.to_string(),
        source,
    })?;

    let mut drains = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        drains.push(tokio::spawn(drain(
            name.to_string(),
            stdout,
            Origin::Stdout,
            health.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        drains.push(tokio::spawn(drain(
            name.to_string(),
            stderr,
            Origin::Stderr,
            health.clone(),
        )));
    }
    Ok((child, drains))
}

async fn join_drains(drains: &mut Vec<JoinHandle<()>>) {
    for mut handle in drains.drain(..) {
        if tokio::time::timeout(DRAIN_GRACE, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
    if let Some(pid) = child.id() {
        // Safety: pid is our direct child and has not been reaped yet.
        #[cfg(unix)]
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            let status = status?;
            debug!(%status, "bot process exited after SIGTERM");
            Ok(())
        }
        Err(_elapsed) => {
            warn!(grace_secs = grace.as_secs(), "bot process ignored SIGTERM, killing");
            child.kill().await?;
            Ok(())
        }
    }
}

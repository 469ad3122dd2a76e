use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle phase of a supervised bot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Child process alive (as of the last health check).
    Running,
    /// Crashed; waiting for the backoff window before the next spawn.
    Backoff,
    /// Restart budget exhausted. Stays put until the config entry changes.
    Abandoned,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Running => "running",
            Phase::Backoff => "backoff",
            Phase::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of one identity, as returned by `status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotStatus {
    pub name: String,
    pub phase: Phase,
    pub healthy: bool,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub pid: Option<u32>,
}

/// Result of a `start()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    /// A child for this identity is still alive; nothing was spawned.
    AlreadyRunning,
    /// Still inside the backoff window; retry after `remaining`.
    InBackoff { remaining: Duration },
    Abandoned,
    /// Spawning failed. Counted as a crash.
    Failed(String),
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

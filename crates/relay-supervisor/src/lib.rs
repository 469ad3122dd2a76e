//! Keeps one bot process alive per configured identity.
//!
//! The supervisor reloads the bots document on a fixed interval and
//! reconciles its process set against it:
//! - new identities are spawned, removed ones stopped, changed ones restarted
//! - crashed children are restarted with exponential backoff, up to a budget
//! - child stdout/stderr is mirrored into the supervisor log and scanned for
//!   error lines that mark the process unhealthy
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relay_core::{ConfigSource, SupervisorSettings};
//! use relay_supervisor::{BotSupervisor, ExeLauncher, SupervisorPolicy};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let policy = SupervisorPolicy::from(&SupervisorSettings::default());
//! let supervisor = BotSupervisor::new(policy, Arc::new(ExeLauncher::current()?));
//! let (_tx, rx) = tokio::sync::watch::channel(false);
//! supervisor.run(ConfigSource::from_env(), rx).await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod launcher;
pub mod output;
pub mod supervisor;
pub mod types;

pub use error::{Result, SupervisorError};
pub use launcher::{ExeLauncher, Launcher};
pub use output::ProcessHealth;
pub use supervisor::{BotSupervisor, SupervisorPolicy};
pub use types::{BotStatus, Phase, StartOutcome};

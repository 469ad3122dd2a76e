//! Configuration, settings, errors and the shared backoff policy.

pub mod backoff;
pub mod config;
pub mod error;
pub mod settings;

pub use backoff::BackoffPolicy;
pub use config::{BotConfig, BotsConfig, ConfigSource};
pub use error::{RelayError, Result};
pub use settings::{PipelineSettings, RelaySettings, SupervisorSettings};

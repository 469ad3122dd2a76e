//! Error types for the relay-supervisor crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The bot process could not be spawned.
    #[error("failed to spawn bot {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Underlying I/O failure (wait, signal).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SupervisorError>;

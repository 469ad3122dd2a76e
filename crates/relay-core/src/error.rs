use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found while validating a bots document, each prefixed
    /// with the dotted path of the offending field.
    #[error("Configuration validation failed:\n{}", format_issues(.0))]
    ConfigInvalid(Vec<String>),

    #[error("Config file not found: {path} (create a bots.json file or set CONFIG_FILE)")]
    ConfigNotFound { path: String },

    #[error("Bot '{name}' not found in configuration. Available bots: {available}")]
    UnknownBot { name: String, available: String },

    #[error("Secret source error ({secret}): {reason}")]
    Secret { secret: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Short error code used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::ConfigInvalid(_) => "CONFIG_INVALID",
            RelayError::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            RelayError::UnknownBot { .. } => "UNKNOWN_BOT",
            RelayError::Secret { .. } => "SECRET_ERROR",
            RelayError::Serialization(_) => "SERIALIZATION_ERROR",
            RelayError::Io(_) => "IO_ERROR",
        }
    }
}

fn format_issues(issues: &[String]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, RelayError>;

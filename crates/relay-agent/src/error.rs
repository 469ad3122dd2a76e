/// Failure of a single request to the agent backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("client error ({status}): {body}")]
    Client { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// Timeouts, transport failures and 5xx responses are worth another try.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Transport(_) | Self::Server { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        if status >= 500 {
            Self::Server { status, body }
        } else {
            Self::Client { status, body }
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

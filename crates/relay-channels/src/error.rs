use thiserror::Error;

/// Errors raised by an outbound channel implementation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An id handed to the channel is not valid for the platform.
    #[error("Invalid target id: {0}")]
    InvalidTarget(String),

    /// The channel rejected the supplied credentials or token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

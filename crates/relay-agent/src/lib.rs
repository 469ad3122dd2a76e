pub mod backend;
pub mod error;
pub mod letta;
pub mod message;
pub mod retry;

pub use backend::AgentBackend;
pub use error::BackendError;
pub use letta::LettaClient;
pub use message::{extract_reply, AgentMessage, ImageSource, MessageContent};
pub use retry::{send_with_retry, RetryPolicy};

pub mod channel;
pub mod error;
pub mod send;
pub mod types;

pub use channel::ChatChannel;
pub use error::ChannelError;
pub use send::{chunk_message, send_chunked_reply, ChunkOptions};
pub use types::{AttachmentRef, InboundEvent, OutboundFile};

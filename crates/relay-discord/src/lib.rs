pub mod adapter;
pub mod error;
pub mod handler;
pub mod outbound;

pub use adapter::DiscordAdapter;
pub use error::DiscordError;
pub use handler::{strip_mentions, RelayHandler};
pub use outbound::DiscordOutbound;

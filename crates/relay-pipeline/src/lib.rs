pub mod attach;
pub mod debounce;
pub mod dedup;
pub mod error;
pub mod lock;
pub mod relay;
pub mod store;

pub use attach::{AttachmentPipeline, DownloadedAttachment, ImageInfo};
pub use debounce::{format_batch, Batch, BatchSink, DebounceAggregator};
pub use dedup::DedupLedger;
pub use error::{PipelineError, Result};
pub use lock::InstanceLock;
pub use relay::Relay;
pub use store::{content_hash, ContentStore};

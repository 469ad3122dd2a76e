use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("{size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

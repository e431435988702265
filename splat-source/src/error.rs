use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplatSourceError>;

#[derive(Debug, Error)]
pub enum SplatSourceError {
    #[error("File IO error")]
    File(#[from] std::io::Error),

    #[error("Zip error")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error")]
    Http(#[from] reqwest::Error),

    #[error("Fetch failed with status {0}")]
    Status(u16),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown source")]
    UnknownSource,
}

//! Error taxonomy shared by every command.
//!
//! Variants carry rendered strings instead of source errors so a single
//! outcome can be cloned to every caller awaiting the same download.

/// Errors returned by murmur commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown model: {0}")]
    NotFound(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("download failed: {0}")]
    Network(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("model load failed: {0}")]
    Load(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("model {0} has nothing to remove")]
    NotRemovable(String),
    #[error("model {0} is not downloaded")]
    NotDownloaded(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Catalog(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

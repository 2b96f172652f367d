//! Error taxonomy for the indexing engine.
//!
//! Every failure is scoped: `Parse` and `Storage` fail one artifact, `Download`
//! skips one file until the next pass, `Configuration` is rejected before any
//! work is scheduled. A panic inside one artifact's task is caught and
//! reported as `Panicked` for that artifact alone. Identity conflicts are
//! resolved, never raised.

use std::any::Any;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("malformed class or metadata: {0}")]
    Parse(String),

    #[error("download failed for {file}: {reason}")]
    Download { file: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl IndexError {
    pub fn parse(message: impl Into<String>) -> Self {
        IndexError::Parse(message.into())
    }

    pub fn download(file: impl Into<String>, reason: impl ToString) -> Self {
        IndexError::Download {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Converts a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(message) => message.to_string(),
                None => "unknown panic payload".to_string(),
            },
        };
        IndexError::Panicked(message)
    }

    /// Whether the next scheduled pass should try the same artifact again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Download { .. } | IndexError::Storage(_))
    }
}

impl From<heed::Error> for IndexError {
    fn from(err: heed::Error) -> Self {
        IndexError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for IndexError {
    fn from(err: toml::de::Error) -> Self {
        IndexError::Parse(err.to_string())
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

//! Errors from persistence operations

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The caller stopped waiting; the queued task may still run later
    #[error("Timed out after {0:?} waiting for queued task (outcome unknown)")]
    Timeout(Duration),

    #[error("Persisted document {} is corrupt: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Invalid asset payload: {0}")]
    InvalidAsset(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence worker is gone")]
    WorkerGone,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True when the caller cannot know whether the task ran
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result alias for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = StoreError::io("/data/state.json", io::Error::other("disk full"));
        let msg = err.to_string();
        assert!(msg.contains("/data/state.json"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_timeout_is_unknown_outcome() {
        let err = StoreError::Timeout(Duration::from_secs(10));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("outcome unknown"));
        assert!(!StoreError::WorkerGone.is_timeout());
    }
}

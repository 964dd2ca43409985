//! Error types for the media cache

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The persistent store could not be opened, read or written
#[derive(Debug)]
pub enum StorageError {
    Unavailable(String),
    Io(Box<std::io::Error>),
    Serialization(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StorageError::Io(err) => write!(f, "Storage IO error: {}", err),
            StorageError::Serialization(msg) => write!(f, "Storage serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// A download for a cache miss did not produce an entry
///
/// Cloneable so every caller attached to a coalesced download receives the
/// same failure.
#[derive(Debug, Clone)]
pub enum FetchError {
    Download(Arc<dyn std::error::Error + Send + Sync>),
    TimedOut(Duration),
    Aborted(String),
    InvalidKey(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Download(err) => write!(f, "Download failed: {}", err),
            FetchError::TimedOut(limit) => {
                write!(f, "Download timed out after {} ms", limit.as_millis())
            }
            FetchError::Aborted(msg) => write!(f, "Download aborted: {}", msg),
            FetchError::InvalidKey(msg) => write!(f, "Invalid cache key: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Download(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

//! Error types for scorecard sync

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for a sync run
///
/// Only [`SyncError::Config`] and [`SyncError::FetchFailed`] are expected to
/// terminate a run under normal conditions. Storage read problems are
/// recovered where they occur and never reach this type.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch of page {page} failed after {attempts} attempt(s): {message}")]
    FetchFailed {
        page: u32,
        attempts: u32,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a terminal fetch error
    pub fn fetch_failed(page: u32, attempts: u32, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            page,
            attempts,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

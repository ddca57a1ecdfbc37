//! Archive storage error types.

use thiserror::Error;

/// Archive storage error type.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid download options: {0}")]
    InvalidOptions(String),

    #[error("archive path is a directory: {0}")]
    OutputIsDirectory(String),

    #[error("shasum mismatch: expected {expected}, got {actual}")]
    ShasumMismatch { expected: String, actual: String },

    #[error("unexpected {method} response status: {status}")]
    UnexpectedStatus { method: &'static str, status: u16 },

    #[error("range {start}-{end} returned {got} bytes")]
    TruncatedRange { start: u64, end: u64, got: u64 },

    #[error("upstream transfer failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for archive storage operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

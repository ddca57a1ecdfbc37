//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid archive name: {0}")]
    InvalidArchiveName(String),

    #[error("invalid provider address: {0}")]
    InvalidProviderRef(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

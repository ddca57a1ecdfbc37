//! Mirror coordination error types.

use terrapin_metadata::StoreError;
use thiserror::Error;

/// Mirror coordination error type.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed upstream payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl MirrorError {
    /// Whether this error is a metadata miss that upstream sync could not
    /// repair, as opposed to a transport or storage fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_miss())
    }
}

/// Result type for mirror operations.
pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

//! Metadata store error types.

use thiserror::Error;

/// Metadata store error type.
///
/// The first four variants are precise miss signals the cache coordinator
/// repairs by syncing from upstream; everything else is a real fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider not found")]
    ProviderNotFound,

    #[error("version not found")]
    VersionNotFound,

    #[error("platform not found")]
    PlatformNotFound,

    #[error("platforms incomplete")]
    PlatformsIncomplete,

    #[error("corrupt metadata record: {0}")]
    Corrupt(String),

    #[error("failed to open metadata database: {0}")]
    Open(Box<redb::DatabaseError>),

    #[error("metadata transaction failed: {0}")]
    Transaction(Box<redb::TransactionError>),

    #[error("metadata table access failed: {0}")]
    Table(Box<redb::TableError>),

    #[error("metadata storage failed: {0}")]
    Storage(Box<redb::StorageError>),

    #[error("metadata commit failed: {0}")]
    Commit(Box<redb::CommitError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error is one of the repairable miss signals.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotFound
                | Self::VersionNotFound
                | Self::PlatformNotFound
                | Self::PlatformsIncomplete
        )
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Open(Box::new(e))
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        Self::Table(Box::new(e))
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(Box::new(e))
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        Self::Commit(Box::new(e))
    }
}

/// Result type for metadata store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

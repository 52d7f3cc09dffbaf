//! Error types for the timeline store and the paging engine.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store was opened read-only")]
    ReadOnly,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure raised by a [`TimelineSource`](crate::paging::TimelineSource)
/// while fetching items.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Recoverable failure of one load cycle.
///
/// Neither variant leaves partial state in the store; the caller decides
/// whether to retry.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The fetch failed. Nothing was written.
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    /// The merge transaction failed and was rolled back.
    #[error("Transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl LoadError {
    /// Whether re-issuing the same load can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Transport(_) => true,
            LoadError::Transaction(StoreError::ReadOnly)
            | LoadError::Transaction(StoreError::InvalidOperation(_))
            | LoadError::Transaction(StoreError::InvalidFormat(_)) => false,
            LoadError::Transaction(_) => true,
        }
    }
}

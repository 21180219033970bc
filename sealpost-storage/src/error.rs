//! At-rest storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the at-rest storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("encryption not initialized: no master password session")]
    NotInitialized,

    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("data directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    #[error("corrupt storage file {name}: {detail}")]
    CorruptFile { name: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

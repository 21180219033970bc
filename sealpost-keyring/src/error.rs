//! Keyring error types.

use thiserror::Error;

/// Result type for keyring operations.
pub type KeyringResult<T> = Result<T, KeyringError>;

/// Errors that can occur in key management and the envelope protocol.
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("encryption not initialized: no master password session")]
    EncryptionNotInitialized,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid ASCII armor: {0}")]
    InvalidArmorFormat(String),

    #[error("not an encrypted message: {0}")]
    InvalidMessageFormat(String),

    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("no recipients specified")]
    NoRecipients,

    #[error("corrupt key data: {0}")]
    CorruptKeyData(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sealpost_storage::StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] sealpost_crypto::CryptoError),
}

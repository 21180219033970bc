//! Primitive-layer error types.

use thiserror::Error;

/// Result type for primitive operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the primitive adapter.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    Keygen(String),

    #[error("invalid PEM key material: {0}")]
    InvalidPem(String),

    #[error("RSA-OAEP operation failed: {0}")]
    Oaep(String),

    #[error("invalid PKCS7 padding")]
    BadPadding,

    #[error("ciphertext length {0} is not a multiple of the AES block size")]
    BadCiphertextLength(usize),

    #[error("malformed token: {0}")]
    InvalidTokenFormat(String),

    #[error("token authentication failed")]
    AuthenticationFailed,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

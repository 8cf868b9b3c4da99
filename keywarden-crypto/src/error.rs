//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while deriving keys or processing envelopes.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed envelope: {0}")]
    Format(String),

    #[error("MAC verification failed")]
    Integrity,

    #[error("invalid PKCS#7 padding")]
    Padding,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),
}

//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material is missing, malformed or the wrong length.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or corrupted data.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Sealed value is not valid base64 or is too short.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Password hashing failed or a stored hash could not be parsed.
    #[error("Password hash error: {0}")]
    PasswordHash(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

//! FHE Error types

use thiserror::Error;

/// Errors that can occur during FHE operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FHEError {
    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid ciphertext
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Ciphertext was produced by a different scheme
    #[error("Scheme mismatch: expected {expected}, got {got}")]
    SchemeMismatch { expected: String, got: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Overflow during computation
    #[error("Overflow during computation")]
    Overflow,

    /// Underflow during computation
    #[error("Underflow during computation")]
    Underflow,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<bincode::Error> for FHEError {
    fn from(e: bincode::Error) -> Self {
        FHEError::SerializationError(e.to_string())
    }
}

//! Error types shared across layers.

use thiserror::Error;

/// Errors raised by a [`Cipher`](super::Cipher) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

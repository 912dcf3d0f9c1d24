//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (authentication tag mismatch or wrong key)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid nonce length
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected nonce length in bytes
        expected: usize,
        /// Actual nonce length in bytes
        actual: usize,
    },

    /// Ciphertext too short to contain nonce and tag
    #[error("Ciphertext too short: need at least {minimum} bytes, got {actual}")]
    CiphertextTooShort {
        /// Minimum length in bytes
        minimum: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Key export failed
    #[error("Key export failed: {0}")]
    KeyExportFailed(String),

    /// Hex or UTF-8 decoding failed
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Plaintext could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::InvalidEncoding(e.to_string())
    }
}

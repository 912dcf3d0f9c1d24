//! # Encrypted Envelopes
//!
//! Structured RPC content is serialized to JSON and sealed under a shared
//! secret into `{iv, cipherText}`, both hex-encoded on the wire.

use crate::symmetric::{self, Nonce, SecretKey};
use crate::CryptoError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Ciphertext plus the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Hex-encoded 12-byte nonce
    pub iv: String,
    /// Hex-encoded ciphertext with trailing tag
    pub cipher_text: String,
}

impl EncryptedEnvelope {
    /// Seal raw bytes.
    pub fn seal(key: &SecretKey, plaintext: &[u8]) -> Result<Self, CryptoError> {
        let (ciphertext, nonce) = symmetric::encrypt(key, plaintext)?;
        Ok(Self {
            iv: hex::encode(nonce.as_bytes()),
            cipher_text: hex::encode(ciphertext),
        })
    }

    /// Open and return the raw plaintext.
    pub fn open(&self, key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(&hex::decode(&self.iv)?)?;
        let ciphertext = hex::decode(&self.cipher_text)?;
        symmetric::decrypt(key, &ciphertext, &nonce)
    }
}

/// Serialize `content` to JSON and seal it.
pub fn encrypt_content<T: Serialize>(
    content: &T,
    key: &SecretKey,
) -> Result<EncryptedEnvelope, CryptoError> {
    let plaintext =
        serde_json::to_vec(content).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    EncryptedEnvelope::seal(key, &plaintext)
}

/// Open an envelope and deserialize the JSON content.
pub fn decrypt_content<T: DeserializeOwned>(
    envelope: &EncryptedEnvelope,
    key: &SecretKey,
) -> Result<T, CryptoError> {
    let plaintext = envelope.open(key)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Serialization(e.to_string()))
}

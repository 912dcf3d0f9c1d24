//! # Key Agreement (ECDH over P-256)
//!
//! Each side holds a P-256 keypair. Public keys travel as hex-encoded
//! SubjectPublicKeyInfo DER; private keys are persisted as hex-encoded
//! PKCS#8 DER. The shared AES-256-GCM key is the raw ECDH x-coordinate, so
//! (A-private, B-public) and (B-private, A-public) derive the same key.

use crate::symmetric::SecretKey;
use crate::CryptoError;
use p256::ecdh::diffie_hellman;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use zeroize::Zeroizing;

/// P-256 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct EcPublicKey(p256::PublicKey);

impl EcPublicKey {
    /// Import from hex-encoded SPKI DER.
    pub fn from_spki_hex(value: &str) -> Result<Self, CryptoError> {
        let der = hex::decode(value.trim_start_matches("0x"))?;
        p256::PublicKey::from_public_key_der(&der)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Export as hex-encoded SPKI DER.
    pub fn to_spki_hex(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyExportFailed(e.to_string()))?;
        Ok(hex::encode(der.as_bytes()))
    }
}

impl std::fmt::Debug for EcPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_spki_hex() {
            Ok(hex) => write!(f, "EcPublicKey({})", hex),
            Err(_) => f.write_str("EcPublicKey(<unencodable>)"),
        }
    }
}

/// P-256 keypair. The secret scalar is zeroized on drop.
#[derive(Clone)]
pub struct EcKeyPair {
    secret: p256::SecretKey,
}

impl EcKeyPair {
    /// Generate a fresh keypair from OS entropy.
    pub fn generate() -> Self {
        Self {
            secret: p256::SecretKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Import a persisted private key (hex-encoded PKCS#8 DER).
    pub fn from_pkcs8_hex(value: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(hex::decode(value)?);
        p256::SecretKey::from_pkcs8_der(&der)
            .map(|secret| Self { secret })
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// Export the private key for persistence (hex-encoded PKCS#8 DER).
    pub fn to_pkcs8_hex(&self) -> Result<Zeroizing<String>, CryptoError> {
        let der = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyExportFailed(e.to_string()))?;
        Ok(Zeroizing::new(hex::encode(der.as_bytes())))
    }

    /// Public half.
    pub fn public_key(&self) -> EcPublicKey {
        EcPublicKey(self.secret.public_key())
    }
}

impl std::fmt::Debug for EcKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Derive the AES-256-GCM key shared with `peer`.
pub fn derive_shared_secret(own: &EcKeyPair, peer: &EcPublicKey) -> SecretKey {
    let shared = diffie_hellman(own.secret.to_nonzero_scalar(), peer.0.as_affine());
    let mut bytes = Zeroizing::new([0u8; 32]);
    bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
    SecretKey::from_bytes(*bytes)
}

//! # Shared Crypto - Key Agreement and Payload Encryption
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `key_agreement` | ECDH P-256 | Per-pair shared secret for the popup protocol |
//! | `symmetric` | AES-256-GCM | Authenticated encryption |
//! | `envelope` | AES-256-GCM + JSON | `{iv, cipherText}` RPC envelopes |
//! | `relay_cipher` | AES-256-GCM | Relay session payloads (`iv | tag | ct` hex) |
//! | `hashing` | SHA-256 | Relay session key derivation, random ids |
//!
//! ## Security Properties
//!
//! - **AES-GCM**: fresh 96-bit nonce per message, tag checked on every open
//! - **ECDH**: secret is a pure function of the two keys; never transmitted
//! - **Key material**: zeroized on drop, `Debug` output redacted

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod key_agreement;
pub mod relay_cipher;
pub mod symmetric;

// Re-exports
pub use envelope::{decrypt_content, encrypt_content, EncryptedEnvelope};
pub use errors::CryptoError;
pub use hashing::{random_bytes_hex, sha256_hex};
pub use key_agreement::{derive_shared_secret, EcKeyPair, EcPublicKey};
pub use relay_cipher::RelayCipher;
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

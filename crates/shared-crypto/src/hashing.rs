//! # Hashing and Random Identifiers
//!
//! SHA-256 hex digests and hex-encoded random byte strings, as used for
//! relay session ids, secrets and keys.

use sha2::{Digest, Sha256};

/// SHA-256 of `input`, lowercase hex.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// `len` random bytes from the OS RNG, lowercase hex (`2 * len` chars).
pub fn random_bytes_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_bytes_hex_length() {
        assert_eq!(random_bytes_hex(16).len(), 32);
        assert_eq!(random_bytes_hex(32).len(), 64);
        assert_ne!(random_bytes_hex(8), random_bytes_hex(8));
    }
}

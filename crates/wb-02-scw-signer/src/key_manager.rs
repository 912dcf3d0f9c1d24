//! # SCW Key Manager
//!
//! Holds this side's P-256 keypair, the wallet's public key and the derived
//! AES-256-GCM secret. Keys persist under `-CBWSDK:SCWKeyManager:*`; the
//! secret is never persisted and is re-derived whenever either key changes.

use parking_lot::Mutex;
use shared_crypto::{derive_shared_secret, CryptoError, EcKeyPair, EcPublicKey, SecretKey};
use shared_types::{KeyValueStore, ScopedStorage};
use std::sync::Arc;
use tracing::{debug, warn};

const STORAGE_SCOPE: &str = "CBWSDK";
const STORAGE_MODULE: &str = "SCWKeyManager";

const OWN_PRIVATE_KEY: &str = "ownPrivateKey";
const OWN_PUBLIC_KEY: &str = "ownPublicKey";
const PEER_PUBLIC_KEY: &str = "peerPublicKey";

#[derive(Default)]
struct KeyState {
    own: Option<EcKeyPair>,
    peer: Option<EcPublicKey>,
    shared_secret: Option<SecretKey>,
    /// Bumped on every peer key change
    peer_epoch: u64,
}

/// Key agreement state for one dApp origin.
pub struct ScwKeyManager {
    storage: ScopedStorage,
    state: Mutex<KeyState>,
}

impl ScwKeyManager {
    /// Key manager persisting into `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage: ScopedStorage::new(STORAGE_SCOPE, STORAGE_MODULE, store),
            state: Mutex::new(KeyState::default()),
        }
    }

    /// Own public key, generating and persisting a keypair on first use.
    pub fn get_own_public_key(&self) -> Result<EcPublicKey, CryptoError> {
        let mut state = self.state.lock();
        self.load_keys_if_needed(&mut state)?;
        match &state.own {
            Some(own) => Ok(own.public_key()),
            None => Err(CryptoError::InvalidPrivateKey),
        }
    }

    /// Own public key as hex SPKI, the form sent in `sender`.
    pub fn own_public_key_hex(&self) -> Result<String, CryptoError> {
        self.get_own_public_key()?.to_spki_hex()
    }

    /// Shared secret, or `None` until a peer key is known.
    pub fn get_shared_secret(&self) -> Result<Option<SecretKey>, CryptoError> {
        let mut state = self.state.lock();
        self.load_keys_if_needed(&mut state)?;
        Ok(state.shared_secret.clone())
    }

    /// Store the wallet's public key and drop the cached secret.
    pub fn set_peer_public_key(&self, peer: EcPublicKey) -> Result<(), CryptoError> {
        let encoded = peer.to_spki_hex()?;
        let mut state = self.state.lock();
        state.shared_secret = None;
        if state.peer.as_ref() != Some(&peer) {
            state.peer_epoch += 1;
        }
        state.peer = Some(peer);
        self.storage.set_item(PEER_PUBLIC_KEY, &encoded);
        self.load_keys_if_needed(&mut state)
    }

    /// Parse and store a hex SPKI peer key.
    pub fn set_peer_public_key_hex(&self, peer: &str) -> Result<(), CryptoError> {
        self.set_peer_public_key(EcPublicKey::from_spki_hex(peer)?)
    }

    /// Counter that changes whenever the peer key changes.
    pub fn peer_epoch(&self) -> u64 {
        self.state.lock().peer_epoch
    }

    /// Forget every key. A fresh keypair is generated on next access.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let epoch = state.peer_epoch + 1;
        *state = KeyState {
            peer_epoch: epoch,
            ..KeyState::default()
        };
        self.storage.remove_item(OWN_PUBLIC_KEY);
        self.storage.remove_item(OWN_PRIVATE_KEY);
        self.storage.remove_item(PEER_PUBLIC_KEY);
        debug!("SCW keys cleared");
    }

    fn load_keys_if_needed(&self, state: &mut KeyState) -> Result<(), CryptoError> {
        if state.own.is_none() {
            state.own = self.load_own_keypair();
        }
        if state.own.is_none() {
            let generated = EcKeyPair::generate();
            self.storage
                .set_item(OWN_PRIVATE_KEY, generated.to_pkcs8_hex()?.as_str());
            self.storage
                .set_item(OWN_PUBLIC_KEY, &generated.public_key().to_spki_hex()?);
            debug!("Generated SCW keypair");
            state.own = Some(generated);
        }

        if state.peer.is_none() {
            state.peer = self.storage.get_item(PEER_PUBLIC_KEY).and_then(|hex| {
                EcPublicKey::from_spki_hex(&hex)
                    .map_err(|e| warn!(error = %e, "Discarding unreadable peer key"))
                    .ok()
            });
        }

        if state.shared_secret.is_none() {
            if let (Some(own), Some(peer)) = (&state.own, &state.peer) {
                state.shared_secret = Some(derive_shared_secret(own, peer));
            }
        }
        Ok(())
    }

    fn load_own_keypair(&self) -> Option<EcKeyPair> {
        let private = self.storage.get_item(OWN_PRIVATE_KEY)?;
        let keypair = match EcKeyPair::from_pkcs8_hex(&private) {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable own private key");
                return None;
            }
        };
        // A public key that disagrees with the private key means the pair
        // was partially overwritten.
        let public = self.storage.get_item(OWN_PUBLIC_KEY)?;
        match keypair.public_key().to_spki_hex() {
            Ok(expected) if expected == public => Some(keypair),
            _ => {
                warn!("Stored own public key does not match private key");
                None
            }
        }
    }
}

impl std::fmt::Debug for ScwKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScwKeyManager")
            .field("has_own", &state.own.is_some())
            .field("has_peer", &state.peer.is_some())
            .field("peer_epoch", &state.peer_epoch)
            .finish()
    }
}

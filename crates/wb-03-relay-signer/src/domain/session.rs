//! # Relay Session
//!
//! A relay session is a random 16-byte id plus a random 32-byte secret.
//! The secret keys the payload cipher; `key = sha256("{id}, {secret} WalletLink")`
//! authenticates the session to the server and is never used for payloads.
//!
//! Persisted under `-walletlink:{url}:session:{id,secret,linked}`.

use shared_crypto::{random_bytes_hex, sha256_hex, CryptoError, RelayCipher};
use shared_types::{KeyValueStore, ScopedStorage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const STORAGE_SCOPE: &str = "walletlink";
const SESSION_ID: &str = "session:id";
const SESSION_SECRET: &str = "session:secret";
const SESSION_LINKED: &str = "session:linked";

/// Storage view for one relay URL.
pub fn relay_storage(link_api_url: &str, store: Arc<dyn KeyValueStore>) -> ScopedStorage {
    ScopedStorage::new(STORAGE_SCOPE, link_api_url, store)
}

/// Pairing material shared with the wallet.
pub struct RelaySession {
    storage: ScopedStorage,
    id: String,
    secret: String,
    key: String,
    linked: AtomicBool,
}

impl RelaySession {
    fn build(storage: ScopedStorage, id: String, secret: String, linked: bool) -> Self {
        let key = sha256_hex(format!("{}, {} WalletLink", id, secret).as_bytes());
        Self {
            storage,
            id,
            secret,
            key,
            linked: AtomicBool::new(linked),
        }
    }

    /// Fresh random session, persisted immediately.
    pub fn create(storage: ScopedStorage) -> Self {
        let session = Self::build(storage, random_bytes_hex(16), random_bytes_hex(32), false);
        session.save();
        session
    }

    /// Persisted session, if both id and secret are present.
    pub fn load(storage: ScopedStorage) -> Option<Self> {
        let id = storage.get_item(SESSION_ID)?;
        let secret = storage.get_item(SESSION_SECRET)?;
        let linked = storage.get_item(SESSION_LINKED).as_deref() == Some("1");
        Some(Self::build(storage, id, secret, linked))
    }

    /// Persisted session or a new one.
    pub fn load_or_create(storage: ScopedStorage) -> Self {
        match Self::load(storage.clone()) {
            Some(session) => session,
            None => Self::create(storage),
        }
    }

    /// Hex session id shared with the wallet.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hex secret keying the payload cipher.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Server authentication key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a wallet has ever joined.
    pub fn linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    /// Record that a wallet has joined. Never reverts to unlinked.
    pub fn mark_linked(&self) {
        if !self.linked.swap(true, Ordering::SeqCst) {
            self.persist_linked();
        }
    }

    /// Payload cipher keyed by the secret.
    pub fn cipher(&self) -> Result<RelayCipher, CryptoError> {
        RelayCipher::from_hex_secret(&self.secret)
    }

    /// Id currently persisted in storage, which may belong to a newer session.
    pub fn stored_id(&self) -> Option<String> {
        self.storage.get_item(SESSION_ID)
    }

    /// Storage view the session persists to.
    pub fn storage(&self) -> &ScopedStorage {
        &self.storage
    }

    fn save(&self) {
        self.storage.set_item(SESSION_ID, &self.id);
        self.storage.set_item(SESSION_SECRET, &self.secret);
        self.persist_linked();
    }

    fn persist_linked(&self) {
        let value = if self.linked() { "1" } else { "0" };
        self.storage.set_item(SESSION_LINKED, value);
    }
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("id", &self.id)
            .field("linked", &self.linked())
            .finish_non_exhaustive()
    }
}

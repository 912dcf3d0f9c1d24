//! # Scoped Storage
//!
//! Per-origin key/value persistence, namespaced so that clearing one
//! component's keys never touches unrelated entries in the same store.
//!
//! Keys are written as `-{scope}:{module}:{key}`.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Backing store shared by every scope (the browser's localStorage analogue).
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value.
    fn set(&self, key: &str, value: &str);
    /// Remove a value.
    fn remove(&self, key: &str);
    /// All keys currently stored.
    fn keys(&self) -> Vec<String>;
}

/// In-process store. Cloning shares the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// A namespaced view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct ScopedStorage {
    scope: String,
    module: String,
    store: Arc<dyn KeyValueStore>,
}

impl ScopedStorage {
    /// Create a view for `scope`/`module`.
    pub fn new(
        scope: impl Into<String>,
        module: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            scope: scope.into(),
            module: module.into(),
            store,
        }
    }

    /// Fully qualified key as written to the backing store.
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix(), key)
    }

    fn prefix(&self) -> String {
        format!("-{}:{}:", self.scope, self.module)
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.store.get(&self.scoped_key(key))
    }

    pub fn set_item(&self, key: &str, value: &str) {
        self.store.set(&self.scoped_key(key), value);
    }

    pub fn remove_item(&self, key: &str) {
        self.store.remove(&self.scoped_key(key));
    }

    /// Remove every key under this scope and module.
    pub fn clear(&self) {
        let prefix = self.prefix();
        let doomed: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .collect();
        debug!(prefix = %prefix, count = doomed.len(), "Clearing scoped storage");
        for key in doomed {
            self.store.remove(&key);
        }
    }
}

impl std::fmt::Debug for ScopedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStorage")
            .field("scope", &self.scope)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new())
    }

    #[test]
    fn test_scoped_key_format() {
        let storage = ScopedStorage::new("CBWSDK", "SCWKeyManager", store());
        assert_eq!(
            storage.scoped_key("ownPublicKey"),
            "-CBWSDK:SCWKeyManager:ownPublicKey"
        );
    }

    #[test]
    fn test_get_set_remove() {
        let storage = ScopedStorage::new("CBWSDK", "SignerConfigurator", store());
        assert!(storage.get_item("SignerType").is_none());

        storage.set_item("SignerType", "scw");
        assert_eq!(storage.get_item("SignerType").as_deref(), Some("scw"));

        storage.remove_item("SignerType");
        assert!(storage.get_item("SignerType").is_none());
    }

    #[test]
    fn test_clear_leaves_other_scopes_alone() {
        let backing = store();
        let keys = ScopedStorage::new("CBWSDK", "SCWKeyManager", backing.clone());
        let signer = ScopedStorage::new("CBWSDK", "SignerConfigurator", backing.clone());

        keys.set_item("ownPublicKey", "aa");
        keys.set_item("peerPublicKey", "bb");
        signer.set_item("SignerType", "scw");
        backing.set("unrelated", "value");

        keys.clear();

        assert!(keys.get_item("ownPublicKey").is_none());
        assert!(keys.get_item("peerPublicKey").is_none());
        assert_eq!(signer.get_item("SignerType").as_deref(), Some("scw"));
        assert_eq!(backing.get("unrelated").as_deref(), Some("value"));
        assert_eq!(backing.len(), 2);
    }
}

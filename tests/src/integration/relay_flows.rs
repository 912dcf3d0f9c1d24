//! Selector negotiating the relay signer, paired while the popup is open.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use serde_json::json;
    use shared_crypto::EcKeyPair;
    use shared_types::{InMemoryStore, RequestArguments};
    use std::sync::Arc;
    use wb_03_relay_signer::domain::relay_storage;
    use wb_04_signer_selector::{Signer, SignerType};

    #[tokio::test]
    async fn test_popup_pairing_then_walletlink_selection() {
        let store = Arc::new(InMemoryStore::new());
        let (selector, mut log) =
            selector(store.clone(), EcKeyPair::generate(), PopupScript::choosing("walletlink"));

        let accounts = selector.handshake().await.unwrap();
        assert_eq!(accounts, vec![ACCOUNT.to_string()]);

        // The popup was handed the persisted session, then told it paired.
        let session = log.updates.recv().await.unwrap();
        let storage = relay_storage(RELAY_URL, store.clone());
        assert_eq!(
            session["session"]["id"].as_str(),
            storage.get_item("session:id").as_deref()
        );
        assert_eq!(
            session["session"]["secret"].as_str(),
            storage.get_item("session:secret").as_deref()
        );
        assert_eq!(log.updates.recv().await.unwrap(), json!({"connected": true}));

        assert_eq!(selector.load_signer_type(), Some(SignerType::WalletLink));
        let signer = selector.signer().unwrap().unwrap();
        assert!(matches!(signer.as_ref(), Signer::WalletLink(_)));
        assert_eq!(
            selector.request(RequestArguments::method("eth_accounts")).await.unwrap(),
            json!([ACCOUNT])
        );
    }

    #[tokio::test]
    async fn test_walletlink_requests_reach_the_companion_app() {
        let store = Arc::new(InMemoryStore::new());
        let (selector, _log) =
            selector(store, EcKeyPair::generate(), PopupScript::choosing("walletlink"));
        selector.handshake().await.unwrap();

        let signature = selector
            .request(RequestArguments::new("personal_sign", json!(["hello", ACCOUNT])))
            .await
            .unwrap();
        assert_eq!(signature, json!("0xrelaysigned"));
        assert_eq!(
            selector.request(RequestArguments::method("eth_chainId")).await.unwrap(),
            json!("0x1")
        );
    }

    #[tokio::test]
    async fn test_walletlink_disconnect_forgets_accounts() {
        let store = Arc::new(InMemoryStore::new());
        let (selector, _log) =
            selector(store.clone(), EcKeyPair::generate(), PopupScript::choosing("walletlink"));
        selector.handshake().await.unwrap();
        let old_session = relay_storage(RELAY_URL, store.clone()).get_item("session:id");

        selector.disconnect().await.unwrap();
        assert_eq!(selector.load_signer_type(), None);
        let storage = relay_storage(RELAY_URL, store);
        assert!(storage.get_item("Addresses").map_or(true, |a| a.is_empty()));
        assert_ne!(storage.get_item("session:id"), old_session);
    }
}

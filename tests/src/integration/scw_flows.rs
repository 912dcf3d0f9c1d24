//! Selector negotiating the popup-relayed signer.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use serde_json::json;
    use shared_crypto::EcKeyPair;
    use shared_types::{codes, InMemoryStore, RequestArguments};
    use std::sync::Arc;
    use wb_04_signer_selector::SignerType;

    #[tokio::test]
    async fn test_request_accounts_negotiates_scw_then_signs() {
        let store = Arc::new(InMemoryStore::new());
        let (selector, mut log) = selector(store, EcKeyPair::generate(), PopupScript::choosing("scw"));

        let accounts = selector
            .request(RequestArguments::method("eth_requestAccounts"))
            .await
            .unwrap();
        assert_eq!(accounts, json!([ACCOUNT]));
        assert_eq!(log.selects.recv().await.unwrap(), json!({"options": "all"}));
        assert_eq!(selector.load_signer_type(), Some(SignerType::Scw));

        let signature = selector
            .request(RequestArguments::new("personal_sign", json!(["0x68656c6c6f", ACCOUNT])))
            .await
            .unwrap();
        assert_eq!(signature, json!(format!("0xsigned:{}", BASE_CHAIN_ID)));
    }

    #[tokio::test]
    async fn test_remembered_selection_survives_reload() {
        let store = Arc::new(InMemoryStore::new());
        let wallet = EcKeyPair::generate();
        let (first, _log) = selector(store.clone(), wallet.clone(), PopupScript::choosing("scw"));
        first.handshake().await.unwrap();
        drop(first);

        // Same storage, new page: no selection prompt, persisted keys still work.
        let (second, mut log) = selector(store, wallet, PopupScript::choosing("walletlink"));
        let signature = second
            .request(RequestArguments::new("personal_sign", json!(["0x00", ACCOUNT])))
            .await
            .unwrap();
        assert_eq!(signature, json!(format!("0xsigned:{}", BASE_CHAIN_ID)));
        assert!(log.selects.try_recv().is_err());
        assert_eq!(second.load_signer_type(), Some(SignerType::Scw));
    }

    #[tokio::test]
    async fn test_unauthorized_reply_resets_selection_and_keys() {
        let store = Arc::new(InMemoryStore::new());
        let script = PopupScript {
            unauthorized: vec!["eth_sign"],
            ..PopupScript::choosing("scw")
        };
        let (selector, _log) = selector(store.clone(), EcKeyPair::generate(), script);
        selector.handshake().await.unwrap();
        assert!(!keys_with_prefix(&store, "-CBWSDK:SCWKeyManager:").is_empty());

        let err = selector
            .request(RequestArguments::new("eth_sign", json!([ACCOUNT, "0x00"])))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAUTHORIZED);
        assert_eq!(selector.load_signer_type(), None);
        assert!(keys_with_prefix(&store, "-CBWSDK:").is_empty());

        let err = selector
            .request(RequestArguments::new("personal_sign", json!(["0x00", ACCOUNT])))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_disconnect_requires_new_negotiation() {
        let store = Arc::new(InMemoryStore::new());
        let (selector, mut log) = selector(store.clone(), EcKeyPair::generate(), PopupScript::choosing("scw"));
        selector.handshake().await.unwrap();
        selector.disconnect().await.unwrap();

        assert_eq!(selector.load_signer_type(), None);
        assert!(selector.signer().unwrap().is_none());
        assert!(keys_with_prefix(&store, "-CBWSDK:").is_empty());

        let accounts = selector.handshake().await.unwrap();
        assert_eq!(accounts, vec![ACCOUNT.to_string()]);
        log.selects.recv().await.unwrap();
        log.selects.recv().await.unwrap();
    }
}

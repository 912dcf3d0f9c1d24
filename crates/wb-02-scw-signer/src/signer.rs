//! Popup-relayed signer.

use crate::error::ScwError;
use crate::key_manager::ScwKeyManager;
use crate::messages::{
    is_allowed, EncryptedRequest, HandshakeRequest, RequestContent, ResponseContent, RpcResponse,
    RpcResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_crypto::{decrypt_content, encrypt_content};
use shared_types::{
    codes, parse_hex_u64, Address, AppMetadata, KeyValueStore, ProviderError, ProviderResult,
    RequestArguments, Signer,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wb_01_popup_transport::{Message, PopupTransport};

const NO_SESSION: &str = "No valid session found, try requestAccounts before other methods";

/// A chain the wallet reported, with its RPC endpoint when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// EIP-155 chain id
    pub id: u64,
    /// RPC endpoint from the handshake's chain map
    pub rpc_url: Option<String>,
}

impl Chain {
    fn bare(id: u64) -> Self {
        Self { id, rpc_url: None }
    }
}

struct SignerState {
    accounts: Vec<Address>,
    chain: Chain,
    chains: Vec<Chain>,
}

impl SignerState {
    fn fresh(metadata: &AppMetadata) -> Self {
        Self {
            accounts: Vec::new(),
            chain: Chain::bare(metadata.default_chain_id()),
            chains: Vec::new(),
        }
    }

    /// Switch to `chain_id` if the wallet listed it.
    fn update_chain(&mut self, chain_id: u64) -> bool {
        let Some(chain) = self.chains.iter().find(|c| c.id == chain_id).cloned() else {
            return false;
        };
        if chain != self.chain {
            info!(chain_id, "Active chain changed");
            self.chain = chain;
        }
        true
    }
}

/// Signer talking to the wallet popup over an ECDH-keyed encrypted channel.
pub struct ScwSigner {
    metadata: AppMetadata,
    transport: PopupTransport,
    keys: ScwKeyManager,
    state: Mutex<SignerState>,
}

impl ScwSigner {
    /// Signer over `transport`, persisting keys into `store`.
    pub fn new(metadata: AppMetadata, transport: PopupTransport, store: Arc<dyn KeyValueStore>) -> Self {
        let state = SignerState::fresh(&metadata);
        Self {
            metadata,
            transport,
            keys: ScwKeyManager::new(store),
            state: Mutex::new(state),
        }
    }

    /// Accounts learned from the last handshake
    pub fn accounts(&self) -> Vec<Address> {
        self.state.lock().accounts.clone()
    }

    /// Active chain
    pub fn chain(&self) -> Chain {
        self.state.lock().chain.clone()
    }

    /// Chains the wallet has reported
    pub fn known_chains(&self) -> Vec<Chain> {
        self.state.lock().chains.clone()
    }

    /// Key store backing the encrypted channel
    pub fn key_manager(&self) -> &ScwKeyManager {
        &self.keys
    }

    /// Popup channel requests travel over
    pub fn transport(&self) -> &PopupTransport {
        &self.transport
    }

    async fn run_handshake(&self) -> Result<Vec<Address>, ScwError> {
        self.transport.connect().await?;

        let handshake = RequestContent::Handshake(HandshakeRequest {
            method: "eth_requestAccounts".to_string(),
            params: json!({
                "appName": self.metadata.name,
                "appLogoUrl": self.metadata.logo_url,
                "appChainIds": self.metadata.chain_ids,
            }),
        });
        let reply = self
            .transport
            .post_message_and_wait(self.request_message(&handshake)?)
            .await?;

        let content = response_content(&reply)?;
        if let ResponseContent::Failure(err) = content {
            return Err(ScwError::Remote(err));
        }
        let sender = reply
            .sender
            .as_deref()
            .ok_or_else(|| ScwError::Protocol("handshake reply without sender".into()))?;
        self.keys.set_peer_public_key_hex(sender)?;

        let response = self.decrypt_response(content)?;
        let value = match response.result {
            RpcResult::Value(value) => value,
            RpcResult::Error(err) => return Err(ScwError::Remote(err)),
        };
        let accounts: Vec<Address> = serde_json::from_value(value)
            .map_err(|e| ScwError::Protocol(format!("account list: {}", e)))?;

        self.state.lock().accounts = accounts.clone();
        info!(accounts = accounts.len(), "SCW handshake complete");
        Ok(accounts)
    }

    async fn send_request_to_popup(&self, args: RequestArguments) -> Result<Value, ScwError> {
        let epoch = self.keys.peer_epoch();
        let secret = self
            .keys
            .get_shared_secret()?
            .ok_or_else(|| ScwError::Remote(ProviderError::unauthorized(NO_SESSION)))?;

        self.transport.connect().await?;

        let method = args.method.clone();
        let chain_id = self.state.lock().chain.id;
        let envelope = encrypt_content(
            &EncryptedRequest {
                action: args,
                chain_id,
            },
            &secret,
        )?;
        let message = self.request_message(&RequestContent::Encrypted(envelope))?;
        debug!(method = %method, message_id = %message.id, chain_id, "Sending encrypted request");

        let reply = self.transport.post_message_and_wait(message).await?;
        if self.keys.peer_epoch() != epoch {
            warn!(method = %method, "Peer key changed while request was in flight");
            return Err(ScwError::Remote(ProviderError::unauthorized(
                "Session keys changed while the request was in flight",
            )));
        }

        match self.decrypt_response(response_content(&reply)?)?.result {
            RpcResult::Value(value) => Ok(value),
            RpcResult::Error(err) => Err(ScwError::Remote(err)),
        }
    }

    fn request_message(&self, content: &RequestContent) -> Result<Message, ScwError> {
        let content =
            serde_json::to_value(content).map_err(|e| ScwError::Protocol(e.to_string()))?;
        Ok(Message::rpc(self.keys.own_public_key_hex()?, content))
    }

    fn decrypt_response(&self, content: ResponseContent) -> Result<RpcResponse, ScwError> {
        let envelope = match content {
            ResponseContent::Failure(err) => return Err(ScwError::Remote(err)),
            ResponseContent::Encrypted(envelope) => envelope,
        };
        let secret = self
            .keys
            .get_shared_secret()?
            .ok_or_else(|| ScwError::Remote(ProviderError::unauthorized("Invalid session")))?;
        let response: RpcResponse = decrypt_content(&envelope, &secret)?;

        if let Some(chains) = response.data.as_ref().and_then(|d| d.chains.as_ref()) {
            self.record_chains(chains);
        }
        Ok(response)
    }

    fn record_chains(&self, chains: &BTreeMap<String, String>) {
        let parsed: Vec<Chain> = chains
            .iter()
            .filter_map(|(id, url)| match id.parse::<u64>() {
                Ok(id) => Some(Chain {
                    id,
                    rpc_url: Some(url.clone()),
                }),
                Err(_) => {
                    warn!(chain = %id, "Ignoring non-numeric chain id");
                    None
                }
            })
            .collect();

        let mut state = self.state.lock();
        state.chains = parsed;
        let current = state.chain.id;
        state.update_chain(current);
    }

    fn switch_chain(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let chain_id = args
            .param(0)
            .and_then(|p| p.get("chainId"))
            .and_then(|id| match id {
                Value::String(s) => parse_hex_u64(s),
                Value::Number(n) => n.as_u64(),
                _ => None,
            })
            .ok_or_else(|| ProviderError::invalid_params("Expected [{ chainId }]"))?;

        if self.state.lock().update_chain(chain_id) {
            Ok(Value::Null)
        } else {
            Err(ProviderError::new(
                codes::UNSUPPORTED_CHAIN,
                format!("Unrecognized chain ID {}", chain_id),
            ))
        }
    }
}

fn response_content(reply: &Message) -> Result<ResponseContent, ScwError> {
    let content = reply
        .content
        .clone()
        .ok_or_else(|| ScwError::Protocol("reply without content".into()))?;
    serde_json::from_value(content).map_err(|e| ScwError::Protocol(e.to_string()))
}

#[async_trait]
impl Signer for ScwSigner {
    async fn handshake(&self) -> ProviderResult<Vec<Address>> {
        Ok(self.run_handshake().await?)
    }

    async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        match args.method.as_str() {
            "eth_requestAccounts" => {
                let accounts = self.accounts();
                if !accounts.is_empty() {
                    return Ok(json!(accounts));
                }
                Ok(json!(self.run_handshake().await?))
            }
            "wallet_switchEthereumChain" => self.switch_chain(&args),
            method if is_allowed(method) => Ok(self.send_request_to_popup(args).await?),
            method => Err(ProviderError::unsupported_method(format!(
                "Method {} is not supported by this signer",
                method
            ))),
        }
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        self.keys.clear();
        *self.state.lock() = SignerState::fresh(&self.metadata);
        self.transport.disconnect();
        info!("SCW signer disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::{derive_shared_secret, EcKeyPair, EcPublicKey, SecretKey};
    use shared_types::InMemoryStore;
    use tokio::sync::mpsc;
    use wb_01_popup_transport::{ChannelWindowOpener, PopupConfig, RemoteWindow};

    const POPUP_URL: &str = "https://keys.wallet.example/connect";
    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    /// What the wallet answers to `method`; `None` means the user closes
    /// the popup instead.
    fn wallet_reply(method: &str, chain_id: u64, secret: &SecretKey) -> Option<ResponseContent> {
        let response = match method {
            "personal_sign" => RpcResponse::value(json!(format!("0xsigned:{}", chain_id))),
            "eth_signTypedData_v4" => {
                RpcResponse::error(ProviderError::user_rejected_request("User denied"))
            }
            "eth_sign" => {
                return Some(ResponseContent::Failure(ProviderError::new(
                    -32000,
                    "protocol failure",
                )))
            }
            "eth_sendTransaction" => return None,
            _ => RpcResponse::value(Value::Null),
        };
        Some(ResponseContent::Encrypted(
            encrypt_content(&response, secret).unwrap(),
        ))
    }

    async fn serve(mut remote: RemoteWindow, wallet: EcKeyPair) {
        let wallet_hex = wallet.public_key().to_spki_hex().unwrap();
        if remote.load().await.is_none() {
            return;
        }
        while let Some(message) = remote.recv().await {
            let peer = EcPublicKey::from_spki_hex(message.sender.as_deref().unwrap()).unwrap();
            let secret = derive_shared_secret(&wallet, &peer);
            let content: RequestContent =
                serde_json::from_value(message.content.clone().unwrap()).unwrap();

            let reply_content = match content {
                RequestContent::Handshake(h) => {
                    assert_eq!(h.method, "eth_requestAccounts");
                    assert_eq!(h.params["appName"], "Test DApp");
                    let response = RpcResponse {
                        result: RpcResult::Value(json!([ACCOUNT])),
                        data: Some(crate::messages::ResponseData {
                            chains: Some(BTreeMap::from([
                                ("1".to_string(), "https://eth.example".to_string()),
                                ("8453".to_string(), "https://base.example".to_string()),
                            ])),
                            capabilities: None,
                        }),
                    };
                    ResponseContent::Encrypted(encrypt_content(&response, &secret).unwrap())
                }
                RequestContent::Encrypted(envelope) => {
                    let request: EncryptedRequest = decrypt_content(&envelope, &secret).unwrap();
                    match wallet_reply(&request.action.method, request.chain_id, &secret) {
                        Some(content) => content,
                        None => {
                            remote.close();
                            return;
                        }
                    }
                }
            };

            let reply = Message {
                request_id: Some(message.id),
                ..Message::rpc(wallet_hex.clone(), serde_json::to_value(reply_content).unwrap())
            };
            remote.send(&reply);
        }
    }

    fn spawn_wallet(mut remotes: mpsc::UnboundedReceiver<RemoteWindow>) {
        tokio::spawn(async move {
            let wallet = EcKeyPair::generate();
            while let Some(remote) = remotes.recv().await {
                serve(remote, wallet.clone()).await;
            }
        });
    }

    fn signer_with_store(store: Arc<InMemoryStore>) -> ScwSigner {
        let (opener, remotes) = ChannelWindowOpener::new("https://keys.wallet.example");
        spawn_wallet(remotes);
        let transport = PopupTransport::new(PopupConfig::new(POPUP_URL), Arc::new(opener)).unwrap();
        let metadata = AppMetadata {
            name: "Test DApp".into(),
            logo_url: None,
            chain_ids: vec![8453],
        };
        ScwSigner::new(metadata, transport, store)
    }

    fn signer() -> ScwSigner {
        signer_with_store(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_handshake_returns_accounts_and_chains() {
        let signer = signer();
        let accounts = signer.handshake().await.unwrap();

        assert_eq!(accounts, vec![ACCOUNT.to_string()]);
        assert_eq!(signer.chain().id, 8453);
        assert_eq!(
            signer.chain().rpc_url.as_deref(),
            Some("https://base.example")
        );
        assert_eq!(signer.known_chains().len(), 2);
        assert!(signer.key_manager().get_shared_secret().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_encrypted_request_round_trip() {
        let signer = signer();
        signer.handshake().await.unwrap();

        let result = signer
            .request(RequestArguments::new("personal_sign", json!(["0x00", ACCOUNT])))
            .await
            .unwrap();
        assert_eq!(result, json!("0xsigned:8453"));
    }

    #[tokio::test]
    async fn test_request_without_session_is_unauthorized() {
        let signer = signer();
        let err = signer
            .request(RequestArguments::new("personal_sign", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAUTHORIZED);
        assert_eq!(err.message, NO_SESSION);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let signer = signer();
        let err = signer
            .request(RequestArguments::method("eth_getBalance"))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_METHOD);
        assert!(!signer.transport().is_connected());
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_unmodified() {
        let signer = signer();
        signer.handshake().await.unwrap();

        let err = signer
            .request(RequestArguments::new("eth_signTypedData_v4", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::user_rejected_request("User denied"));

        let err = signer
            .request(RequestArguments::new("eth_sign", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "protocol failure");
    }

    #[tokio::test]
    async fn test_popup_closed_mid_request_rejects() {
        let signer = signer();
        signer.handshake().await.unwrap();

        let err = signer
            .request(RequestArguments::new("eth_sendTransaction", json!([{}])))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::USER_REJECTED_REQUEST);
    }

    #[tokio::test]
    async fn test_request_accounts_cached_after_handshake() {
        let signer = signer();
        signer.handshake().await.unwrap();
        signer.transport().disconnect();

        let accounts = signer
            .request(RequestArguments::method("eth_requestAccounts"))
            .await
            .unwrap();
        assert_eq!(accounts, json!([ACCOUNT]));
        assert!(!signer.transport().is_connected());
    }

    #[tokio::test]
    async fn test_switch_chain() {
        let signer = signer();
        signer.handshake().await.unwrap();

        let result = signer
            .request(RequestArguments::new(
                "wallet_switchEthereumChain",
                json!([{"chainId": "0x1"}]),
            ))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(signer.chain().id, 1);

        let err = signer
            .request(RequestArguments::new(
                "wallet_switchEthereumChain",
                json!([{"chainId": "0x89"}]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_CHAIN);
        assert_eq!(signer.chain().id, 1);
    }

    #[tokio::test]
    async fn test_disconnect_forgets_session() {
        let store = Arc::new(InMemoryStore::new());
        let signer = signer_with_store(store.clone());
        signer.handshake().await.unwrap();
        assert!(!store.is_empty());

        signer.disconnect().await.unwrap();
        assert!(signer.accounts().is_empty());
        assert!(store.get("-CBWSDK:SCWKeyManager:peerPublicKey").is_none());

        let err = signer
            .request(RequestArguments::new("personal_sign", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_resumes_from_storage() {
        let store = Arc::new(InMemoryStore::new());
        {
            let first = signer_with_store(store.clone());
            first.handshake().await.unwrap();
        }

        let resumed = signer_with_store(store);
        assert!(resumed.key_manager().get_shared_secret().unwrap().is_some());
    }
}

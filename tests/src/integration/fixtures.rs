//! Fake counterparties shared by the flows.

use serde_json::{json, Value};
use shared_crypto::{decrypt_content, derive_shared_secret, encrypt_content, EcKeyPair, EcPublicKey};
use shared_types::{AppMetadata, InMemoryStore, KeyValueStore, ProviderError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use wb_01_popup_transport::{ChannelWindowOpener, ConfigEvent, Message, PopupConfig, PopupTransport, RemoteWindow};
use wb_02_scw_signer::messages::{EncryptedRequest, RequestContent, ResponseContent, ResponseData};
use wb_02_scw_signer::{RpcResponse, RpcResult};
use wb_03_relay_signer::domain::{relay_storage, ClientMessage, ServerMessage};
use wb_03_relay_signer::{
    MemoryEventsApi, MemorySocketConnector, RelayConfig, ServerSocket, WalletLinkEventData,
    Web3Request, Web3Response,
};
use wb_04_signer_selector::{Preference, RelaySetup, SignerSelector};

pub const POPUP_ORIGIN: &str = "https://keys.wallet.example";
pub const POPUP_URL: &str = "https://keys.wallet.example/connect";
pub const RELAY_URL: &str = "http://relay.test";
pub const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";
pub const BASE_CHAIN_ID: u64 = 8453;

/// How the fake popup wallet behaves.
#[derive(Clone)]
pub struct PopupScript {
    /// Reply to `selectSignerType`
    pub choice: Value,
    /// Encrypted requests for these methods fail with 4100
    pub unauthorized: Vec<&'static str>,
}

impl PopupScript {
    pub fn choosing(choice: &str) -> Self {
        Self {
            choice: json!(choice),
            unauthorized: Vec::new(),
        }
    }
}

/// What the popup observed.
pub struct PopupLog {
    pub selects: mpsc::UnboundedReceiver<Value>,
    pub updates: mpsc::UnboundedReceiver<Value>,
}

#[derive(Clone)]
struct PopupTaps {
    selects: mpsc::UnboundedSender<Value>,
    updates: mpsc::UnboundedSender<Value>,
}

fn encrypted_reply(request: &EncryptedRequest, script: &PopupScript, secret: &shared_crypto::SecretKey) -> ResponseContent {
    let method = request.action.method.as_str();
    if script.unauthorized.contains(&method) {
        return ResponseContent::Failure(ProviderError::unauthorized("Invalid session"));
    }
    let response = match method {
        "personal_sign" => RpcResponse::value(json!(format!("0xsigned:{}", request.chain_id))),
        _ => RpcResponse::value(Value::Null),
    };
    ResponseContent::Encrypted(encrypt_content(&response, secret).unwrap())
}

fn handshake_reply(secret: &shared_crypto::SecretKey) -> ResponseContent {
    let response = RpcResponse {
        result: RpcResult::Value(json!([ACCOUNT])),
        data: Some(ResponseData {
            chains: Some(BTreeMap::from([
                ("1".to_string(), "https://eth.example".to_string()),
                (BASE_CHAIN_ID.to_string(), "https://base.example".to_string()),
            ])),
            capabilities: None,
        }),
    };
    ResponseContent::Encrypted(encrypt_content(&response, secret).unwrap())
}

/// Wait for the relay pairing the dApp reports through `WalletLinkUpdate`.
async fn pair_through_relay(remote: &mut RemoteWindow, taps: &PopupTaps) {
    remote.send(&Message::config(ConfigEvent::WalletLinkSessionRequest, None));
    while let Some(update) = remote.recv().await {
        if !update.is_event(&ConfigEvent::WalletLinkUpdate) {
            continue;
        }
        let data = update.data.clone().unwrap_or(Value::Null);
        let _ = taps.updates.send(data.clone());
        if data["connected"] == json!(true) {
            return;
        }
    }
}

async fn serve_popup(mut remote: RemoteWindow, wallet: EcKeyPair, script: PopupScript, taps: PopupTaps) {
    let wallet_hex = wallet.public_key().to_spki_hex().unwrap();
    if remote.load().await.is_none() {
        return;
    }
    while let Some(message) = remote.recv().await {
        if message.is_event(&ConfigEvent::SelectSignerType) {
            let _ = taps.selects.send(message.data.clone().unwrap_or(Value::Null));
            if script.choice == json!("walletlink") {
                pair_through_relay(&mut remote, &taps).await;
            }
            remote.send(&Message::reply(message.id, script.choice.clone()));
            continue;
        }
        let (Some(sender), Some(content)) = (message.sender.as_deref(), message.content.clone()) else {
            continue;
        };

        let peer = EcPublicKey::from_spki_hex(sender).unwrap();
        let secret = derive_shared_secret(&wallet, &peer);
        let reply_content = match serde_json::from_value::<RequestContent>(content).unwrap() {
            RequestContent::Handshake(_) => handshake_reply(&secret),
            RequestContent::Encrypted(envelope) => {
                let request: EncryptedRequest = decrypt_content(&envelope, &secret).unwrap();
                encrypted_reply(&request, &script, &secret)
            }
        };
        remote.send(&Message {
            request_id: Some(message.id),
            ..Message::rpc(wallet_hex.clone(), serde_json::to_value(reply_content).unwrap())
        });
    }
}

/// Spawn the popup wallet behind a fresh transport.
pub fn popup_transport(wallet: EcKeyPair, script: PopupScript) -> (PopupTransport, PopupLog) {
    wb_telemetry::init_test_logging();
    let (opener, mut remotes) = ChannelWindowOpener::new(POPUP_ORIGIN);
    let (selects_tx, selects) = mpsc::unbounded_channel();
    let (updates_tx, updates) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let taps = PopupTaps {
            selects: selects_tx,
            updates: updates_tx,
        };
        // Each opened window is served on its own task.
        while let Some(remote) = remotes.recv().await {
            tokio::spawn(serve_popup(remote, wallet.clone(), script.clone(), taps.clone()));
        }
    });
    let transport = PopupTransport::new(PopupConfig::new(POPUP_URL), Arc::new(opener)).unwrap();
    (transport, PopupLog { selects, updates })
}

/// Companion app on one relay socket. Decrypts with whatever session
/// secret the dApp has persisted in `store`.
async fn serve_relay_socket(mut server: ServerSocket, store: Arc<InMemoryStore>) {
    let Some(session_id) = server.accept_session(true, BTreeMap::new()).await else {
        return;
    };
    while let Some(message) = server.recv().await {
        let ClientMessage::PublishEvent { id, data, .. } = message else {
            continue;
        };
        server.send(&ServerMessage::PublishEventOk {
            id,
            session_id: session_id.clone(),
            event_id: format!("ev{}", id),
        });

        let Some(secret) = relay_storage(RELAY_URL, store.clone()).get_item("session:secret") else {
            continue;
        };
        let cipher = shared_crypto::RelayCipher::from_hex_secret(&secret).unwrap();
        let Ok(WalletLinkEventData::Web3Request { id, request }) =
            serde_json::from_str::<WalletLinkEventData>(&cipher.decrypt(&data).unwrap())
        else {
            continue;
        };
        let result = match &request {
            Web3Request::RequestEthereumAccounts { .. } => json!([ACCOUNT]),
            Web3Request::SignEthereumMessage { .. } => json!("0xrelaysigned"),
            _ => Value::Null,
        };
        let payload = WalletLinkEventData::Web3Response {
            id: id.clone(),
            response: Web3Response::success(request.method(), result),
        };
        server.send(&ServerMessage::Event {
            session_id: session_id.clone(),
            event_id: format!("resp{}", id),
            event: "Web3Response".into(),
            data: cipher.encrypt(&serde_json::to_string(&payload).unwrap()).unwrap(),
        });
    }
}

/// Relay setup backed by an in-memory server that serves every socket.
pub fn relay_setup(store: Arc<InMemoryStore>) -> RelaySetup {
    let (connector, mut sockets) = MemorySocketConnector::new();
    tokio::spawn(async move {
        while let Some(server) = sockets.recv().await {
            tokio::spawn(serve_relay_socket(server, store.clone()));
        }
    });
    RelaySetup {
        config: RelayConfig::new(RELAY_URL),
        connector: Arc::new(connector),
        events_api: Arc::new(MemoryEventsApi::new()),
    }
}

pub fn metadata() -> AppMetadata {
    AppMetadata {
        chain_ids: vec![BASE_CHAIN_ID],
        ..AppMetadata::new("Bridge DApp")
    }
}

/// Selector over a popup wallet and relay server sharing `store`.
pub fn selector(
    store: Arc<InMemoryStore>,
    wallet: EcKeyPair,
    script: PopupScript,
) -> (SignerSelector, PopupLog) {
    let (transport, log) = popup_transport(wallet, script);
    let selector = SignerSelector::new(
        metadata(),
        Preference::default(),
        transport,
        store.clone(),
        relay_setup(store),
    );
    (selector, log)
}

/// Keys in `store` under `prefix`.
pub fn keys_with_prefix(store: &InMemoryStore, prefix: &str) -> Vec<String> {
    store.keys().into_iter().filter(|k| k.starts_with(prefix)).collect()
}

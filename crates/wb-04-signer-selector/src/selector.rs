//! Signer negotiation and routing.
//!
//! The first `eth_requestAccounts` asks the popup which protocol the user
//! picked, builds that signer, runs its handshake and remembers the choice.
//! Later calls go straight to the remembered signer. Any "unauthorized"
//! error from a signer forgets the choice and the signer keys.

use crate::error::SelectorError;
use crate::signer::Signer;
use crate::signer_type::{Preference, SignerType};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{
    Address, AppMetadata, KeyValueStore, ProviderError, ProviderResult, RequestArguments,
    ScopedStorage, Signer as SignerContract,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wb_01_popup_transport::{ConfigEvent, Message, PopupTransport};
use wb_02_scw_signer::{ScwKeyManager, ScwSigner};
use wb_03_relay_signer::{RelayConfig, RelaySocketConnector, UnseenEventsApi, WalletLinkSigner};

const STORAGE_SCOPE: &str = "CBWSDK";
const STORAGE_MODULE: &str = "SignerConfigurator";
const SIGNER_TYPE_KEY: &str = "SignerType";

const REQUEST_ACCOUNTS_FIRST: &str = "Must call 'eth_requestAccounts' before other methods";

/// Everything needed to build a relay signer.
#[derive(Clone)]
pub struct RelaySetup {
    pub config: RelayConfig,
    pub connector: Arc<dyn RelaySocketConnector>,
    pub events_api: Arc<dyn UnseenEventsApi>,
}

impl RelaySetup {
    fn build(
        &self,
        metadata: &AppMetadata,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<WalletLinkSigner, SelectorError> {
        Ok(WalletLinkSigner::new(
            self.config.clone(),
            metadata.clone(),
            store,
            self.connector.clone(),
            self.events_api.clone(),
        )?)
    }
}

/// Picks, builds and remembers the signer for this dApp.
pub struct SignerSelector {
    metadata: AppMetadata,
    preference: Preference,
    transport: PopupTransport,
    store: Arc<dyn KeyValueStore>,
    storage: ScopedStorage,
    relay: RelaySetup,
    signer: Mutex<Option<Arc<Signer>>>,
    negotiation: tokio::sync::Mutex<()>,
    /// Relay pairing served to the popup while the user chooses
    pairing: Mutex<Option<JoinHandle<()>>>,
}

impl SignerSelector {
    pub fn new(
        metadata: AppMetadata,
        preference: Preference,
        transport: PopupTransport,
        store: Arc<dyn KeyValueStore>,
        relay: RelaySetup,
    ) -> Self {
        Self {
            metadata,
            preference,
            transport,
            storage: ScopedStorage::new(STORAGE_SCOPE, STORAGE_MODULE, store.clone()),
            store,
            relay,
            signer: Mutex::new(None),
            negotiation: tokio::sync::Mutex::new(()),
            pairing: Mutex::new(None),
        }
    }

    /// Remembered signer type. Unrecognized values count as absent.
    pub fn load_signer_type(&self) -> Option<SignerType> {
        let stored = self.storage.get_item(SIGNER_TYPE_KEY)?;
        match stored.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                debug!(error = %e, "Ignoring stored signer type");
                None
            }
        }
    }

    pub fn store_signer_type(&self, kind: SignerType) {
        self.storage.set_item(SIGNER_TYPE_KEY, kind.as_str());
    }

    /// Ask the popup which signer the user picked.
    pub async fn fetch_signer_type(&self) -> Result<SignerType, SelectorError> {
        self.transport.connect().await?;
        self.listen_for_wallet_link_session_request();

        let preference = serde_json::to_value(&self.preference)
            .map_err(|e| SelectorError::InvalidReply(e.to_string()))?;
        let request = Message::config(ConfigEvent::SelectSignerType, Some(preference));
        let reply = self.transport.post_message_and_wait(request).await;
        self.stop_pairing();
        let reply = reply?;

        let data = reply.data.unwrap_or(Value::Null);
        let kind = serde_json::from_value(data.clone())
            .map_err(|_| SelectorError::InvalidReply(data.to_string()))?;
        info!(signer_type = %kind, "Signer type selected");
        Ok(kind)
    }

    /// Build a signer of `kind`. Nothing is contacted until its handshake.
    pub fn create_signer(&self, kind: SignerType) -> Result<Signer, SelectorError> {
        Ok(match kind {
            SignerType::Scw => Signer::Scw(ScwSigner::new(
                self.metadata.clone(),
                self.transport.clone(),
                self.store.clone(),
            )),
            SignerType::WalletLink => {
                Signer::WalletLink(self.relay.build(&self.metadata, self.store.clone())?)
            }
        })
    }

    /// The active signer, rebuilding a remembered one on first use.
    pub fn signer(&self) -> Result<Option<Arc<Signer>>, SelectorError> {
        if let Some(signer) = self.signer.lock().clone() {
            return Ok(Some(signer));
        }
        let Some(kind) = self.load_signer_type() else {
            return Ok(None);
        };
        let signer = Arc::new(self.create_signer(kind)?);
        debug!(signer_type = %kind, "Restored remembered signer");
        Ok(Some(
            self.signer.lock().get_or_insert_with(|| signer).clone(),
        ))
    }

    /// Connect to a signer, negotiating one if none is remembered.
    pub async fn handshake(&self) -> ProviderResult<Vec<Address>> {
        let outcome = self.connect_signer().await;
        self.forget_if_unauthorized(outcome).await
    }

    /// Route `args` to the active signer.
    pub async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        if args.method == "eth_requestAccounts" {
            return Ok(json!(self.handshake().await?));
        }
        let outcome = match self.signer() {
            Ok(Some(signer)) => signer.request(args).await,
            Ok(None) => Err(ProviderError::unauthorized(REQUEST_ACCOUNTS_FIRST)),
            Err(e) => Err(e.into()),
        };
        self.forget_if_unauthorized(outcome).await
    }

    /// Forget the remembered signer type and signer keys, then disconnect
    /// the active signer.
    pub async fn disconnect(&self) -> ProviderResult<()> {
        self.stop_pairing();
        self.storage.remove_item(SIGNER_TYPE_KEY);
        ScwKeyManager::new(self.store.clone()).clear();
        let signer = self.signer.lock().take();
        match signer {
            Some(signer) => {
                info!(signer_type = %signer.signer_type(), "Disconnecting signer");
                signer.disconnect().await
            }
            None => Ok(()),
        }
    }

    async fn connect_signer(&self) -> ProviderResult<Vec<Address>> {
        let _guard = self.negotiation.lock().await;
        if let Some(signer) = self.signer()? {
            let accounts = signer
                .request(RequestArguments::method("eth_requestAccounts"))
                .await?;
            return serde_json::from_value(accounts).map_err(ProviderError::from);
        }

        let kind = self.fetch_signer_type().await?;
        let signer = Arc::new(self.create_signer(kind)?);
        let accounts = signer.handshake().await?;
        self.store_signer_type(kind);
        *self.signer.lock() = Some(signer);
        Ok(accounts)
    }

    async fn forget_if_unauthorized<T>(&self, outcome: ProviderResult<T>) -> ProviderResult<T> {
        if let Err(err) = &outcome {
            if err.is_unauthorized() {
                warn!(message = %err.message, "Signer unauthorized, forgetting selection");
                if let Err(e) = self.disconnect().await {
                    warn!(error = %e.message, "Disconnect after unauthorized failed");
                }
            }
        }
        outcome
    }

    /// While the user is choosing, the popup may ask for a relay session to
    /// show as a QR code. Serve it from a short-lived relay signer that
    /// reports back once a wallet has joined.
    fn listen_for_wallet_link_session_request(&self) {
        let requested = self
            .transport
            .on_message(|m| m.is_event(&ConfigEvent::WalletLinkSessionRequest));
        let transport = self.transport.clone();
        let relay = self.relay.clone();
        let metadata = self.metadata.clone();
        let store = self.store.clone();

        let pairing = tokio::spawn(async move {
            if requested.await.is_err() {
                return;
            }
            let signer = match relay.build(&metadata, store) {
                Ok(signer) => signer,
                Err(e) => {
                    warn!(error = %e, "Unable to open relay session for the popup");
                    return;
                }
            };
            let (id, secret) = signer.session_credentials();
            post_update(&transport, json!({ "session": { "id": id, "secret": secret } }));

            match signer.handshake().await {
                Ok(_) => post_update(&transport, json!({ "connected": true })),
                Err(e) => debug!(error = %e.message, "Relay pairing for the popup ended"),
            }
        });
        if let Some(previous) = self.pairing.lock().replace(pairing) {
            previous.abort();
        }
    }

    /// Drop the popup's pairing relay. A chosen relay signer reopens the
    /// session from storage.
    fn stop_pairing(&self) {
        if let Some(pairing) = self.pairing.lock().take() {
            pairing.abort();
        }
    }
}

fn post_update(transport: &PopupTransport, data: Value) {
    let update = Message::config(ConfigEvent::WalletLinkUpdate, Some(data));
    if let Err(e) = transport.post_message(&update, false) {
        warn!(error = %e, "WalletLinkUpdate not delivered");
    }
}

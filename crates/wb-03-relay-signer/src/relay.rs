//! WalletLink relay: web3 request dispatch over a [`RelayConnection`].

use crate::connection::{ConnectionEvent, RelayConnection};
use crate::domain::{
    event_names, relay_storage, RelayConfig, RelayError, RelaySession, WalletLinkEventData,
    Web3Request, Web3Response,
};
use crate::ports::{RelaySocketConnector, UnseenEventsApi};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_crypto::random_bytes_hex;
use shared_types::{codes, AppMetadata, KeyValueStore, ScopedStorage};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const CANCELED_MESSAGE: &str = "User canceled the request";

/// Receives account and chain changes reported by the wallet.
pub trait RelayListener: Send + Sync {
    /// `is_disconnect` is set when the session was reset.
    fn accounts_updated(&self, accounts: &[String], is_disconnect: bool);

    fn chain_updated(&self, json_rpc_url: &str, chain_id: u64);
}

struct PendingWeb3 {
    method: &'static str,
    sender: oneshot::Sender<Web3Response>,
}

struct Current {
    epoch: u64,
    session: Arc<RelaySession>,
    connection: Arc<RelayConnection>,
}

struct RelayInner {
    config: RelayConfig,
    metadata: AppMetadata,
    storage: ScopedStorage,
    connector: Arc<dyn RelaySocketConnector>,
    events_api: Arc<dyn UnseenEventsApi>,
    listener: Arc<dyn RelayListener>,
    current: Mutex<Current>,
    callbacks: DashMap<String, PendingWeb3>,
    last_chain: Mutex<Option<(String, String)>>,
    reset_lock: tokio::sync::Mutex<()>,
}

/// A request in flight to the wallet app.
#[derive(Debug)]
pub struct Web3Handle {
    id: String,
    response: oneshot::Receiver<Web3Response>,
}

impl Web3Handle {
    /// Correlation id, usable with [`WalletLinkRelay::cancel`].
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the wallet. No timeout: the user answers at human speed.
    pub async fn response(self) -> Result<Value, RelayError> {
        let response = self.response.await.map_err(|_| RelayError::Destroyed)?;
        response.into_result().map_err(RelayError::Remote)
    }
}

/// Dispatches web3 requests to a paired wallet app and tracks session state.
#[derive(Clone)]
pub struct WalletLinkRelay {
    inner: Arc<RelayInner>,
}

impl WalletLinkRelay {
    /// Resume the persisted session (or start a new one) and connect.
    pub fn new(
        config: RelayConfig,
        metadata: AppMetadata,
        store: Arc<dyn KeyValueStore>,
        connector: Arc<dyn RelaySocketConnector>,
        events_api: Arc<dyn UnseenEventsApi>,
        listener: Arc<dyn RelayListener>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let storage = relay_storage(&config.link_api_url, store);
        let session = Arc::new(RelaySession::load_or_create(storage.clone()));
        let (connection, events) = RelayConnection::new(
            config.clone(),
            session.clone(),
            connector.clone(),
            events_api.clone(),
        )?;

        let inner = Arc::new(RelayInner {
            config,
            metadata,
            storage,
            connector,
            events_api,
            listener,
            current: Mutex::new(Current {
                epoch: 0,
                session,
                connection: Arc::new(connection),
            }),
            callbacks: DashMap::new(),
            last_chain: Mutex::new(None),
            reset_lock: tokio::sync::Mutex::new(()),
        });
        inner.start(0, events);
        Ok(Self { inner })
    }

    /// The active session.
    pub fn session(&self) -> Arc<RelaySession> {
        self.inner.current.lock().session.clone()
    }

    /// The active connection.
    pub fn connection(&self) -> Arc<RelayConnection> {
        self.inner.current.lock().connection.clone()
    }

    /// Requests still waiting for the wallet.
    pub fn pending_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Publish `request` and return a handle to its eventual response.
    pub async fn submit(&self, request: Web3Request) -> Web3Handle {
        let id = random_bytes_hex(8);
        let method = request.method();
        let (sender, response) = oneshot::channel();
        self.inner
            .callbacks
            .insert(id.clone(), PendingWeb3 { method, sender });

        let connection = self.connection();
        let data = WalletLinkEventData::Web3Request {
            id: id.clone(),
            request,
        };
        match connection
            .publish_event(event_names::WEB3_REQUEST, &data, true)
            .await
        {
            Ok(event_id) => {
                debug!(correlation_id = %id, method, event_id = %event_id, "Web3 request published")
            }
            Err(e) => {
                warn!(correlation_id = %id, method, error = %e, "Web3 request not delivered");
                self.inner
                    .resolve(&id, Web3Response::error(method, e.to_string()));
            }
        }
        Web3Handle { id, response }
    }

    /// Publish `request` and wait for the wallet's answer.
    pub async fn send_request(&self, request: Web3Request) -> Result<Value, RelayError> {
        self.submit(request).await.response().await
    }

    /// Tell the wallet to drop request `id` and fail it locally with 4001.
    pub async fn cancel(&self, id: &str) {
        let Some(method) = self.inner.callbacks.get(id).map(|p| p.method) else {
            return;
        };
        let data = WalletLinkEventData::Web3RequestCanceled { id: id.to_string() };
        if let Err(e) = self
            .connection()
            .publish_event(event_names::WEB3_REQUEST_CANCELED, &data, false)
            .await
        {
            debug!(correlation_id = %id, error = %e, "Cancel notice not delivered");
        }
        let mut response = Web3Response::error(method, CANCELED_MESSAGE);
        response.error_code = Some(codes::USER_REJECTED_REQUEST);
        self.inner.resolve(id, response);
    }

    /// Ask the wallet for accounts, sending the dApp's display metadata.
    pub async fn request_ethereum_accounts(&self) -> Result<Value, RelayError> {
        self.send_request(Web3Request::RequestEthereumAccounts {
            app_name: self.inner.metadata.name.clone(),
            app_logo_url: self.inner.metadata.logo_url.clone(),
        })
        .await
    }

    /// Destroy the session everywhere and start over with a fresh one.
    pub async fn reset_and_reload(&self) {
        let epoch = self.inner.current.lock().epoch;
        self.inner.reset_and_reload(epoch).await;
    }
}

impl std::fmt::Debug for WalletLinkRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLinkRelay")
            .field("session", &self.session())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl RelayInner {
    fn start(self: &Arc<Self>, epoch: u64, events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        tokio::spawn(event_loop(Arc::downgrade(self), epoch, events));
        self.current.lock().connection.connect();
    }

    fn resolve(&self, id: &str, response: Web3Response) {
        if let Some((_, pending)) = self.callbacks.remove(id) {
            let _ = pending.sender.send(response);
        } else {
            debug!(correlation_id = %id, "Response for unknown web3 request");
        }
    }

    async fn handle_event(self: &Arc<Self>, epoch: u64, event: ConnectionEvent) {
        if self.current.lock().epoch != epoch {
            return;
        }
        match event {
            ConnectionEvent::LinkedUpdated(linked) => {
                if linked {
                    self.current.lock().session.mark_linked();
                }
            }
            ConnectionEvent::AccountUpdated(address) => {
                self.listener
                    .accounts_updated(std::slice::from_ref(&address), false);
                let waiting: Vec<String> = self
                    .callbacks
                    .iter()
                    .filter(|entry| entry.method == "requestEthereumAccounts")
                    .map(|entry| entry.key().clone())
                    .collect();
                for id in waiting {
                    self.resolve(
                        &id,
                        Web3Response::success("requestEthereumAccounts", json!([address])),
                    );
                }
            }
            ConnectionEvent::ChainUpdated {
                chain_id,
                json_rpc_url,
            } => {
                let update = (chain_id, json_rpc_url);
                {
                    let mut last = self.last_chain.lock();
                    if last.as_ref() == Some(&update) {
                        return;
                    }
                    *last = Some(update.clone());
                }
                match update.0.parse::<u64>() {
                    Ok(chain_id) => self.listener.chain_updated(&update.1, chain_id),
                    Err(_) => warn!(chain_id = %update.0, "Ignoring non-numeric chain id"),
                }
            }
            ConnectionEvent::MetadataUpdated { key, value } => {
                self.storage.set_item(&key, &value);
            }
            ConnectionEvent::Web3Response { id, response } => self.resolve(&id, response),
            ConnectionEvent::ResetRequested => self.reset_and_reload(epoch).await,
        }
    }

    async fn reset_and_reload(self: &Arc<Self>, epoch: u64) {
        let _guard = self.reset_lock.lock().await;
        let (session, connection) = {
            let current = self.current.lock();
            if current.epoch != epoch {
                return;
            }
            (current.session.clone(), current.connection.clone())
        };

        connection.destroy().await;

        // Another instance may already have replaced the persisted session.
        if session.stored_id().as_deref() == Some(session.id()) {
            self.storage.clear();
        }
        self.listener.accounts_updated(&[], true);
        self.callbacks.clear();
        *self.last_chain.lock() = None;

        let fresh = Arc::new(RelaySession::create(self.storage.clone()));
        let replaced = RelayConnection::new(
            self.config.clone(),
            fresh.clone(),
            self.connector.clone(),
            self.events_api.clone(),
        );
        let (connection, events) = match replaced {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Unable to open a fresh relay session");
                return;
            }
        };
        let next_epoch = epoch + 1;
        *self.current.lock() = Current {
            epoch: next_epoch,
            session: fresh.clone(),
            connection: Arc::new(connection),
        };
        info!(old = %session.id(), new = %fresh.id(), "Relay session reset");
        self.start(next_epoch, events);
    }
}

async fn event_loop(
    relay: Weak<RelayInner>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(relay) = relay.upgrade() else {
            break;
        };
        relay.handle_event(epoch, event).await;
    }
}

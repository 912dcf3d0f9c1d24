//! # Relay Connection
//!
//! One relay session's socket: authentication, heartbeat, reconnect, request
//! correlation by numeric id and decryption of session metadata and events.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──HostSession OK──► Connected
//!      ▲                                                       │
//!      └──── reconnect_delay ◄── socket closed / heartbeat lost┘
//! ```
//!
//! Frames that need an authenticated socket wait in the connect queue;
//! published events additionally wait for the session to be linked. Both
//! queues flush in call order.

use crate::domain::{
    event_names, metadata_keys, ClientMessage, RelayConfig, RelayError, RelaySession,
    ServerMessage, WalletLinkEventData, Web3Response, HEARTBEAT_FRAME,
};
use crate::ports::{RelaySocketConnector, SocketHandle, UnseenEventsApi};
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_crypto::RelayCipher;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

/// Socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open and session authenticated
    Connected,
}

/// Decoded session activity, delivered to the owner of the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    LinkedUpdated(bool),
    AccountUpdated(String),
    ChainUpdated { chain_id: String, json_rpc_url: String },
    MetadataUpdated { key: String, value: String },
    Web3Response { id: String, response: Web3Response },
    /// The session was destroyed remotely
    ResetRequested,
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Connected,
    Linked,
}

struct Queued {
    frame: String,
    sent: oneshot::Sender<()>,
}

struct SocketState {
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    close: Arc<Notify>,
    authenticated: bool,
    linked: bool,
    last_heartbeat: Instant,
    connect_queue: VecDeque<Queued>,
    link_queue: VecDeque<Queued>,
}

impl SocketState {
    fn open(&self, gate: Gate) -> bool {
        match gate {
            Gate::Connected => self.authenticated,
            Gate::Linked => self.authenticated && self.linked,
        }
    }

    fn queue(&mut self, gate: Gate) -> &mut VecDeque<Queued> {
        match gate {
            Gate::Connected => &mut self.connect_queue,
            Gate::Linked => &mut self.link_queue,
        }
    }

    fn send(&self, frame: String) -> Result<(), String> {
        match &self.outbound {
            Some(tx) => tx.send(frame).map_err(|e| e.0),
            None => Err(frame),
        }
    }

    fn flush(&mut self, gate: Gate) {
        if !self.open(gate) {
            return;
        }
        while let Some(queued) = self.queue(gate).pop_front() {
            match self.send(queued.frame) {
                Ok(()) => {
                    let _ = queued.sent.send(());
                }
                Err(frame) => {
                    self.queue(gate).push_front(Queued {
                        frame,
                        sent: queued.sent,
                    });
                    return;
                }
            }
        }
    }
}

/// Removes a request's reply slot when its caller finishes or goes away.
struct PendingReply<'a> {
    requests: &'a DashMap<u64, oneshot::Sender<ServerMessage>>,
    id: u64,
}

impl<'a> PendingReply<'a> {
    fn register(
        requests: &'a DashMap<u64, oneshot::Sender<ServerMessage>>,
        id: u64,
    ) -> (Self, oneshot::Receiver<ServerMessage>) {
        let (tx, rx) = oneshot::channel();
        requests.insert(id, tx);
        (Self { requests, id }, rx)
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.requests.remove(&self.id);
    }
}

struct Inner {
    config: RelayConfig,
    url: Url,
    session: Arc<RelaySession>,
    cipher: RelayCipher,
    connector: Arc<dyn RelaySocketConnector>,
    events_api: Arc<dyn UnseenEventsApi>,
    socket: Mutex<SocketState>,
    state: watch::Sender<ConnectionState>,
    next_request_id: AtomicU64,
    requests: DashMap<u64, oneshot::Sender<ServerMessage>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    destroyed: AtomicBool,
    reset_requested: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Persistent, self-healing connection for one relay session.
pub struct RelayConnection {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayConnection {
    /// Connection for `session`. Call [`connect`](Self::connect) to start it.
    pub fn new(
        config: RelayConfig,
        session: Arc<RelaySession>,
        connector: Arc<dyn RelaySocketConnector>,
        events_api: Arc<dyn UnseenEventsApi>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>), RelayError> {
        config.validate()?;
        let url = config.websocket_url()?;
        let cipher = session.cipher()?;
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            url,
            session,
            cipher,
            connector,
            events_api,
            socket: Mutex::new(SocketState {
                generation: 0,
                outbound: None,
                close: Arc::new(Notify::new()),
                authenticated: false,
                linked: false,
                last_heartbeat: Instant::now(),
                connect_queue: VecDeque::new(),
                link_queue: VecDeque::new(),
            }),
            state,
            next_request_id: AtomicU64::new(1),
            requests: DashMap::new(),
            events,
            destroyed: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            shutdown,
        });

        Ok((
            Self {
                inner,
                task: Mutex::new(None),
            },
            events_rx,
        ))
    }

    /// Start the connection loop. Idempotent.
    pub fn connect(&self) {
        if self.inner.is_destroyed() {
            return;
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let shutdown = self.inner.shutdown.subscribe();
        *task = Some(tokio::spawn(connection_loop(self.inner.clone(), shutdown)));
    }

    /// Session this connection authenticates with.
    pub fn session(&self) -> &Arc<RelaySession> {
        &self.inner.session
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether the server reported a wallet joined the session.
    pub fn is_linked(&self) -> bool {
        self.inner.socket.lock().linked
    }

    /// Whether the session was destroyed; a destroyed connection never reconnects.
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Requests awaiting a server reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.requests.len()
    }

    /// Encrypt `data` and publish it once the session is linked.
    ///
    /// Resolves with the server-assigned event id.
    pub async fn publish_event(
        &self,
        event: &str,
        data: &WalletLinkEventData,
        call_webhook: bool,
    ) -> Result<String, RelayError> {
        if self.inner.is_destroyed() {
            return Err(RelayError::Destroyed);
        }
        let encrypted = self.inner.cipher.encrypt(&serde_json::to_string(data)?)?;
        let message = ClientMessage::PublishEvent {
            id: self.inner.next_id(),
            session_id: self.inner.session.id().to_string(),
            event: event.to_string(),
            data: encrypted,
            call_webhook,
        };

        let reply = self
            .inner
            .make_request(message, Gate::Linked, self.inner.config.request_timeout())
            .await?;
        match reply {
            ServerMessage::PublishEventOk { event_id, .. } => {
                debug!(event, event_id = %event_id, "Relay event published");
                Ok(event_id)
            }
            ServerMessage::Fail { error, .. } => Err(RelayError::Server(or_default(
                error,
                "failed to publish event",
            ))),
            other => Err(RelayError::Protocol(format!(
                "unexpected reply to PublishEvent: {:?}",
                other
            ))),
        }
    }

    /// Store plaintext session metadata on the relay once connected.
    pub async fn set_session_metadata(&self, key: &str, value: &str) -> Result<(), RelayError> {
        if self.inner.is_destroyed() {
            return Err(RelayError::Destroyed);
        }
        self.inner
            .set_session_metadata(key, value, self.inner.config.request_timeout())
            .await
    }

    /// Mark the session destroyed on the relay and stop for good.
    pub async fn destroy(&self) {
        if self.inner.is_destroyed() {
            return;
        }
        let timeout = self.inner.config.destroy_timeout();
        let notice = self
            .inner
            .set_session_metadata(metadata_keys::DESTROYED, "1", timeout);
        match tokio::time::timeout(timeout, notice).await {
            Ok(Ok(())) => debug!("Relay acknowledged session destroy"),
            Ok(Err(e)) => debug!(error = %e, "Session destroy notice failed"),
            Err(_) => debug!("Session destroy notice timed out"),
        }
        self.inner.shut_down();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        info!(session_id = %self.inner.session.id(), "Relay connection destroyed");
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnection")
            .field("session_id", &self.inner.session.id())
            .field("state", &self.state())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn or_default(error: String, fallback: &str) -> String {
    if error.is_empty() {
        fallback.to_string()
    } else {
        error
    }
}

async fn connection_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if inner.is_destroyed() || *shutdown.borrow() {
            break;
        }
        inner.state.send_replace(ConnectionState::Connecting);
        let connected = tokio::select! {
            result = inner.connector.connect(&inner.url) => result,
            _ = shutdown.changed() => break,
        };
        match connected {
            Ok(handle) => inner.clone().run_socket(handle, &mut shutdown).await,
            Err(e) => warn!(error = %e, url = %inner.url, "Relay connection failed"),
        }
        inner.on_disconnected();

        if inner.is_destroyed() || *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(inner.config.reconnect_delay()) => {}
            _ = shutdown.changed() => break,
        }
    }
    inner.state.send_replace(ConnectionState::Disconnected);
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    async fn run_socket(
        self: Arc<Self>,
        handle: SocketHandle,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let SocketHandle {
            outbound,
            mut inbound,
        } = handle;
        let (generation, close) = {
            let mut socket = self.socket.lock();
            socket.generation += 1;
            socket.outbound = Some(outbound);
            socket.authenticated = false;
            socket.close = Arc::new(Notify::new());
            (socket.generation, socket.close.clone())
        };
        debug!(generation, "Relay socket open, authenticating");

        let auth = tokio::spawn(self.clone().authenticate(generation));
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = close.notified() => break,
                frame = inbound.recv() => match frame {
                    Some(text) => self.handle_frame(&text),
                    None => {
                        debug!(generation, "Relay closed the socket");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if !self.heartbeat() {
                        warn!(generation, "Relay heartbeat lost");
                        break;
                    }
                }
            }
        }
        auth.abort();
    }

    async fn authenticate(self: Arc<Self>, generation: u64) {
        let message = ClientMessage::HostSession {
            id: self.next_id(),
            session_id: self.session.id().to_string(),
            session_key: self.session.key().to_string(),
        };
        match self.request_now(generation, message).await {
            Ok(ServerMessage::Ok { .. }) => {}
            Ok(ServerMessage::Fail { error, .. }) => {
                warn!(error = %error, "Relay rejected session");
                self.close_socket(generation);
                return;
            }
            Ok(other) => {
                warn!(reply = ?other, "Unexpected reply to HostSession");
                self.close_socket(generation);
                return;
            }
            Err(e) => {
                warn!(error = %e, "Relay authentication failed");
                self.close_socket(generation);
                return;
            }
        }

        let session_id = self.session.id().to_string();
        self.send_now(
            generation,
            &ClientMessage::IsLinked {
                id: self.next_id(),
                session_id: session_id.clone(),
            },
        );
        self.send_now(
            generation,
            &ClientMessage::GetSessionConfig {
                id: self.next_id(),
                session_id,
            },
        );

        {
            let mut socket = self.socket.lock();
            if socket.generation != generation {
                return;
            }
            socket.authenticated = true;
            socket.last_heartbeat = Instant::now();
            socket.flush(Gate::Connected);
            socket.flush(Gate::Linked);
            let _ = socket.send(HEARTBEAT_FRAME.to_string());
        }
        self.state.send_replace(ConnectionState::Connected);
        info!(session_id = %self.session.id(), "Relay session connected");

        self.fetch_unseen_events().await;
    }

    /// Send on the socket of `generation`, bypassing the queues.
    fn send_now(&self, generation: u64, message: &ClientMessage) -> bool {
        let Ok(frame) = serde_json::to_string(message) else {
            return false;
        };
        let socket = self.socket.lock();
        socket.generation == generation && socket.send(frame).is_ok()
    }

    async fn request_now(
        &self,
        generation: u64,
        message: ClientMessage,
    ) -> Result<ServerMessage, RelayError> {
        let id = message.id();
        let (_pending, rx) = PendingReply::register(&self.requests, id);
        if !self.send_now(generation, &message) {
            return Err(RelayError::Socket("socket closed".into()));
        }
        self.await_reply(id, rx, self.config.request_timeout()).await
    }

    /// Queue behind `gate`, then wait `timeout` for the reply once sent.
    async fn make_request(
        &self,
        message: ClientMessage,
        gate: Gate,
        timeout: Duration,
    ) -> Result<ServerMessage, RelayError> {
        let id = message.id();
        let frame = serde_json::to_string(&message)?;
        let (_pending, rx) = PendingReply::register(&self.requests, id);

        let (sent_tx, sent_rx) = oneshot::channel();
        {
            let mut socket = self.socket.lock();
            socket.queue(gate).push_back(Queued {
                frame,
                sent: sent_tx,
            });
            socket.flush(gate);
        }
        if sent_rx.await.is_err() {
            return Err(RelayError::Destroyed);
        }
        self.await_reply(id, rx, timeout).await
    }

    async fn await_reply(
        &self,
        id: u64,
        rx: oneshot::Receiver<ServerMessage>,
        timeout: Duration,
    ) -> Result<ServerMessage, RelayError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RelayError::Destroyed),
            Err(_) => Err(RelayError::Timeout(id)),
        }
    }

    async fn set_session_metadata(
        &self,
        key: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), RelayError> {
        let message = ClientMessage::SetSessionConfig {
            id: self.next_id(),
            session_id: self.session.id().to_string(),
            metadata: BTreeMap::from([(key.to_string(), value.to_string())]),
        };
        match self.make_request(message, Gate::Connected, timeout).await? {
            ServerMessage::Fail { error, .. } => Err(RelayError::Server(or_default(
                error,
                "failed to set session metadata",
            ))),
            _ => Ok(()),
        }
    }

    /// Returns false when the peer has gone silent.
    fn heartbeat(&self) -> bool {
        let socket = self.socket.lock();
        if !socket.authenticated {
            return true;
        }
        if socket.last_heartbeat.elapsed() > self.config.heartbeat_timeout() {
            return false;
        }
        let _ = socket.send(HEARTBEAT_FRAME.to_string());
        true
    }

    fn close_socket(&self, generation: u64) {
        let socket = self.socket.lock();
        if socket.generation == generation {
            socket.close.notify_one();
        }
    }

    fn on_disconnected(&self) {
        {
            let mut socket = self.socket.lock();
            socket.outbound = None;
            socket.authenticated = false;
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn shut_down(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        {
            let mut socket = self.socket.lock();
            socket.outbound = None;
            socket.authenticated = false;
            socket.connect_queue.clear();
            socket.link_queue.clear();
            socket.close.notify_one();
        }
        self.requests.clear();
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn handle_frame(&self, text: &str) {
        if text == HEARTBEAT_FRAME {
            self.socket.lock().last_heartbeat = Instant::now();
            return;
        }
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Dropping unreadable relay frame");
                return;
            }
        };

        match &message {
            ServerMessage::IsLinkedOk {
                linked,
                online_guests,
                ..
            } => self.set_linked(*linked || *online_guests > 0),
            ServerMessage::Linked { online_guests, .. } => self.set_linked(*online_guests > 0),
            ServerMessage::GetSessionConfigOk { metadata, .. }
            | ServerMessage::SessionConfigUpdated { metadata, .. } => {
                self.handle_metadata(metadata)
            }
            ServerMessage::Event { event, data, .. } => self.handle_incoming_event(event, data),
            _ => {}
        }

        if let Some(id) = message.id() {
            if let Some((_, tx)) = self.requests.remove(&id) {
                let _ = tx.send(message);
            }
        }
    }

    fn set_linked(&self, linked: bool) {
        {
            let mut socket = self.socket.lock();
            socket.linked = linked;
            if linked {
                socket.flush(Gate::Linked);
            }
        }
        debug!(linked, "Relay link status");
        self.emit(ConnectionEvent::LinkedUpdated(linked));
    }

    fn decrypt_field(&self, key: &str, value: &str) -> Option<String> {
        self.cipher
            .decrypt(value)
            .map_err(|e| warn!(key, error = %e, "Dropping undecryptable session metadata"))
            .ok()
    }

    fn handle_metadata(&self, metadata: &BTreeMap<String, String>) {
        if metadata.get(metadata_keys::DESTROYED).map(String::as_str) == Some("1")
            && !self.reset_requested.swap(true, Ordering::SeqCst)
        {
            info!(session_id = %self.session.id(), "Session destroyed by the wallet");
            self.emit(ConnectionEvent::ResetRequested);
        }

        if let Some(value) = metadata.get(metadata_keys::ETHEREUM_ADDRESS) {
            if let Some(address) = self.decrypt_field(metadata_keys::ETHEREUM_ADDRESS, value) {
                self.emit(ConnectionEvent::AccountUpdated(address));
            }
        }

        for key in [metadata_keys::WALLET_USERNAME, metadata_keys::APP_VERSION] {
            if let Some(value) = metadata.get(key) {
                if let Some(value) = self.decrypt_field(key, value) {
                    self.emit(ConnectionEvent::MetadataUpdated {
                        key: key.to_string(),
                        value,
                    });
                }
            }
        }

        if let (Some(chain_id), Some(json_rpc_url)) = (
            metadata.get(metadata_keys::CHAIN_ID),
            metadata.get(metadata_keys::JSON_RPC_URL),
        ) {
            let chain_id = self.decrypt_field(metadata_keys::CHAIN_ID, chain_id);
            let json_rpc_url = self.decrypt_field(metadata_keys::JSON_RPC_URL, json_rpc_url);
            if let (Some(chain_id), Some(json_rpc_url)) = (chain_id, json_rpc_url) {
                self.emit(ConnectionEvent::ChainUpdated {
                    chain_id,
                    json_rpc_url,
                });
            }
        }
    }

    fn handle_incoming_event(&self, event: &str, data: &str) {
        if event != event_names::WEB3_RESPONSE {
            return;
        }
        let Some(plaintext) = self.decrypt_field(event, data) else {
            return;
        };
        match serde_json::from_str::<WalletLinkEventData>(&plaintext) {
            Ok(WalletLinkEventData::Web3Response { id, response }) => {
                debug!(correlation_id = %id, method = %response.method, "Web3 response received");
                self.emit(ConnectionEvent::Web3Response { id, response });
            }
            Ok(_) => debug!("Ignoring non-response event payload"),
            Err(e) => warn!(error = %e, "Dropping malformed web3 response"),
        }
    }

    async fn fetch_unseen_events(&self) {
        let events = match self.events_api.fetch_unseen_events(&self.session).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Unable to fetch unseen events");
                return;
            }
        };
        let responses: Vec<_> = events
            .into_iter()
            .filter(|e| e.event == event_names::WEB3_RESPONSE)
            .collect();
        if !responses.is_empty() {
            debug!(count = responses.len(), "Delivering missed relay events");
        }
        for event in &responses {
            self.handle_incoming_event(&event.event, &event.data);
        }
        for event in responses {
            if let Err(e) = self.events_api.mark_seen(&self.session, &event.id).await {
                warn!(event_id = %event.id, error = %e, "Unable to mark event as seen");
            }
        }
    }
}

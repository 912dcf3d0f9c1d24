//! Popup transport service.
//!
//! Owns the window, the dispatch task reading its inbound stream, the
//! correlation store and the one-shot listeners. No lock is held across an
//! `.await`.

use crate::domain::{
    ConfigEvent, Message, PendingRequestStore, PendingResult, PopupConfig, TransportError,
};
use crate::ports::{InboundMessage, PopupWindow, WindowOpener};
use parking_lot::Mutex;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No window open
    Disconnected,
    /// Window open, handshake not finished
    Connecting,
    /// Handshake done
    Connected,
}

type Predicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

struct Listener {
    predicate: Predicate,
    sender: oneshot::Sender<PendingResult>,
}

struct ActiveWindow {
    window: Arc<dyn PopupWindow>,
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    handshake_done: bool,
}

struct Inner {
    config: PopupConfig,
    url: Url,
    target_origin: Option<String>,
    opener: Arc<dyn WindowOpener>,
    state: Mutex<Option<ActiveWindow>>,
    generations: AtomicU64,
    pending: PendingRequestStore,
    listeners: Mutex<Vec<Listener>>,
    connect_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<Message>,
}

/// Request/response channel to a popup window.
///
/// Cheap to clone; clones share the same window and correlation state.
#[derive(Clone)]
pub struct PopupTransport {
    inner: Arc<Inner>,
}

impl PopupTransport {
    /// Create a transport for `config.url`. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(config: PopupConfig, opener: Arc<dyn WindowOpener>) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let url = config
            .parsed_url()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let origin = url.origin();
        let target_origin = origin.is_tuple().then(|| origin.ascii_serialization());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                url,
                target_origin,
                opener,
                state: Mutex::new(None),
                generations: AtomicU64::new(0),
                pending: PendingRequestStore::new(),
                listeners: Mutex::new(Vec::new()),
                connect_lock: tokio::sync::Mutex::new(()),
                events,
            }),
        })
    }

    /// Popup URL
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Current state
    pub fn state(&self) -> TransportState {
        match self.inner.state.lock().as_ref() {
            None => TransportState::Disconnected,
            Some(active) if active.handshake_done => TransportState::Connected,
            Some(_) => TransportState::Connecting,
        }
    }

    /// True once the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// Number of requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Subscribe to config events that no pending request or listener
    /// consumed.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Message> {
        self.inner.events.subscribe()
    }

    /// Open the popup and run the load handshake.
    ///
    /// Idempotent; concurrent callers wait on the same handshake.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.inner.connect_lock.lock().await;
        match self.state() {
            TransportState::Connected => return Ok(()),
            // Leftover from a failed handshake
            TransportState::Connecting => self.inner.disconnect(),
            TransportState::Disconnected => {}
        }

        let handle = self.inner.opener.open(&self.inner.url).await?;
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let loaded = self.on_message(|m| m.is_event(&ConfigEvent::PopupLoaded));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.inner.state.lock() = Some(ActiveWindow {
            window: handle.window,
            generation,
            shutdown: Some(shutdown_tx),
            handshake_done: false,
        });
        tokio::spawn(dispatch_loop(
            Arc::downgrade(&self.inner),
            generation,
            handle.inbound,
            shutdown_rx,
        ));
        debug!(url = %self.inner.url, generation, "Popup opened, waiting for load");

        // Cancelled only when the popup goes away before loading.
        let loaded = loaded.await.map_err(|_| TransportError::UserRejected)?;
        let reply = Message::reply(loaded.id, json!({ "version": self.inner.config.version }));
        if let Err(e) = self.post_message(&reply, false) {
            self.inner.disconnect();
            return Err(e);
        }

        let mut state = self.inner.state.lock();
        match state.as_mut() {
            Some(active) if active.generation == generation => {
                active.handshake_done = true;
                info!(url = %self.inner.url, "Popup connected");
                Ok(())
            }
            _ => Err(TransportError::UserRejected),
        }
    }

    /// Post `message` to the popup.
    ///
    /// With `bypass_origin_check` a popup whose URL has no concrete origin
    /// is posted to with target `"*"`.
    pub fn post_message(
        &self,
        message: &Message,
        bypass_origin_check: bool,
    ) -> Result<(), TransportError> {
        let window = self
            .inner
            .window()
            .ok_or(TransportError::NoRemoteContext)?;
        if window.is_closed() {
            self.inner.disconnect();
            return Err(TransportError::NoRemoteContext);
        }

        let target = match (&self.inner.target_origin, bypass_origin_check) {
            (Some(origin), _) => origin.as_str(),
            (None, true) => "*",
            (None, false) => return Err(TransportError::NoTargetOrigin),
        };

        let data = serde_json::to_value(message)?;
        window.post_message(data, target)?;
        debug!(message_id = %message.id, "Posted message");
        Ok(())
    }

    /// Post `message` and wait for the reply whose `requestId` is its id.
    ///
    /// Rejects with [`TransportError::UserRejected`] if the popup goes away
    /// first.
    pub async fn post_message_and_wait(&self, message: Message) -> Result<Message, TransportError> {
        let id = message.id;
        let reply = self.inner.pending.register(id);

        if let Err(e) = self.post_message(&message, false) {
            self.inner.pending.cancel(id);
            return Err(e);
        }

        reply.await.unwrap_or(Err(TransportError::UserRejected))
    }

    /// Resolve with the first inbound message matching `predicate`.
    ///
    /// The listener is registered immediately, before the returned future
    /// is polled.
    pub fn on_message<F>(
        &self,
        predicate: F,
    ) -> impl Future<Output = Result<Message, TransportError>> + Send + 'static
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.inner.listeners.lock().push(Listener {
            predicate: Box::new(predicate),
            sender: tx,
        });
        async move { rx.await.unwrap_or(Err(TransportError::ListenerCancelled)) }
    }

    /// Close the popup, reject every pending request with "user rejected"
    /// and cancel every listener.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

impl Inner {
    fn window(&self) -> Option<Arc<dyn PopupWindow>> {
        self.state.lock().as_ref().map(|a| Arc::clone(&a.window))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state
            .lock()
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    fn disconnect(&self) {
        let active = self.state.lock().take();
        if let Some(mut active) = active {
            if let Some(shutdown) = active.shutdown.take() {
                let _ = shutdown.send(());
            }
            active.window.close();
            info!(url = %self.url, "Popup disconnected");
        }

        self.pending.reject_all(&TransportError::UserRejected);

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            let _ = listener.sender.send(Err(TransportError::ListenerCancelled));
        }
    }

    /// Route one inbound message. Returns false when the window is gone.
    fn dispatch(&self, inbound: InboundMessage) -> bool {
        if self.target_origin.as_deref() != Some(inbound.origin.as_str()) {
            debug!(origin = %inbound.origin, "Dropping message from unexpected origin");
            return true;
        }

        let message: Message = match serde_json::from_value(inbound.data) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "Dropping malformed message");
                return true;
            }
        };

        if message.is_event(&ConfigEvent::PopupUnload) {
            info!("Popup unloaded");
            self.disconnect();
            return false;
        }

        if let Some(request_id) = message.request_id {
            if self.pending.complete(request_id, message.clone()) {
                return true;
            }
        }

        let matched: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            let (matched, rest) = std::mem::take(&mut *listeners)
                .into_iter()
                .filter(|l| !l.sender.is_closed())
                .partition(|l| (l.predicate)(&message));
            *listeners = rest;
            matched
        };

        let delivered = !matched.is_empty();
        for listener in matched {
            let _ = listener.sender.send(Ok(message.clone()));
        }

        if !delivered && message.event.is_some() && self.events.send(message).is_err() {
            debug!("Config event with no subscriber");
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(mut active) = self.state.get_mut().take() {
            if let Some(shutdown) = active.shutdown.take() {
                let _ = shutdown.send(());
            }
            active.window.close();
        }
    }
}

async fn dispatch_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!(generation, "Dispatch loop stopped");
                return;
            }
            next = inbound.recv() => {
                let Some(inner) = inner.upgrade() else { return };
                match next {
                    Some(message) => {
                        if !inner.dispatch(message) {
                            return;
                        }
                    }
                    None => {
                        if inner.is_current(generation) {
                            warn!(generation, "Popup closed by remote side");
                            inner.disconnect();
                        }
                        return;
                    }
                }
            }
        }
    }
}

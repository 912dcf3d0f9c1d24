//! In-process window adapter.
//!
//! Each `open` creates a pair of unbounded channels. The transport side gets
//! a [`ChannelWindow`]; the other end, a [`RemoteWindow`], is handed to
//! whoever plays the popup (an embedding webview bridge, or a test).

use crate::domain::{ConfigEvent, Message, TransportError};
use crate::ports::{InboundMessage, PopupHandle, PopupWindow, WindowOpener};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// A message the transport posted into the window.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    /// Raw payload
    pub data: Value,
    /// Origin restriction the transport asked for
    pub target_origin: String,
}

/// Transport-side half of an in-process window.
pub struct ChannelWindow {
    outbound: Mutex<Option<mpsc::UnboundedSender<PostedMessage>>>,
    closed: Arc<AtomicBool>,
}

impl PopupWindow for ChannelWindow {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::PostFailed("window closed".into()));
        }
        let guard = self.outbound.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| TransportError::PostFailed("window closed".into()))?;
        sender
            .send(PostedMessage {
                data,
                target_origin: target_origin.to_string(),
            })
            .map_err(|_| TransportError::PostFailed("remote side gone".into()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.outbound.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Popup-side half of an in-process window.
pub struct RemoteWindow {
    url: Url,
    origin: String,
    posted: mpsc::UnboundedReceiver<PostedMessage>,
    inbound: Option<mpsc::UnboundedSender<InboundMessage>>,
    closed: Arc<AtomicBool>,
}

impl RemoteWindow {
    /// URL the transport opened
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Next raw message posted by the transport; `None` once the window closed.
    pub async fn recv_posted(&mut self) -> Option<PostedMessage> {
        self.posted.recv().await
    }

    /// Next posted message that parses as a [`Message`].
    pub async fn recv(&mut self) -> Option<Message> {
        while let Some(posted) = self.posted.recv().await {
            match serde_json::from_value(posted.data) {
                Ok(message) => return Some(message),
                Err(e) => debug!(error = %e, "Skipping unparseable posted message"),
            }
        }
        None
    }

    /// Send `message` from this window's own origin.
    pub fn send(&self, message: &Message) -> bool {
        match serde_json::to_value(message) {
            Ok(data) => self.send_raw(&self.origin, data),
            Err(_) => false,
        }
    }

    /// Send a raw payload claiming to come from `origin`.
    pub fn send_raw(&self, origin: &str, data: Value) -> bool {
        match &self.inbound {
            Some(tx) => tx
                .send(InboundMessage {
                    origin: origin.to_string(),
                    data,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Announce `PopupLoaded` and wait for the handshake reply.
    pub async fn load(&mut self) -> Option<Message> {
        let loaded = Message::config(ConfigEvent::PopupLoaded, None);
        if !self.send(&loaded) {
            return None;
        }
        while let Some(message) = self.recv().await {
            if message.request_id == Some(loaded.id) {
                return Some(message);
            }
        }
        None
    }

    /// Close from the popup side; ends the transport's inbound stream.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound.take();
    }

    /// Whether either side closed the window.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// [`WindowOpener`] that hands every opened [`RemoteWindow`] to a channel.
pub struct ChannelWindowOpener {
    origin: String,
    remotes: mpsc::UnboundedSender<RemoteWindow>,
}

impl ChannelWindowOpener {
    /// Opener whose windows send from `origin`, plus the stream of opened
    /// remote halves.
    pub fn new(origin: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RemoteWindow>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                origin: origin.into(),
                remotes: tx,
            },
            rx,
        )
    }

    /// Opener whose windows send from the origin of `url`.
    pub fn for_url(url: &Url) -> (Self, mpsc::UnboundedReceiver<RemoteWindow>) {
        Self::new(url.origin().ascii_serialization())
    }
}

#[async_trait]
impl WindowOpener for ChannelWindowOpener {
    async fn open(&self, url: &Url) -> Result<PopupHandle, TransportError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let remote = RemoteWindow {
            url: url.clone(),
            origin: self.origin.clone(),
            posted: out_rx,
            inbound: Some(in_tx),
            closed: Arc::clone(&closed),
        };
        self.remotes
            .send(remote)
            .map_err(|_| TransportError::WindowOpenFailed("no popup host".into()))?;

        debug!(url = %url, "Opened channel window");
        Ok(PopupHandle {
            window: Arc::new(ChannelWindow {
                outbound: Mutex::new(Some(out_tx)),
                closed,
            }),
            inbound: in_rx,
        })
    }
}

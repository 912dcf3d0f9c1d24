//! Window ports.
//!
//! The transport never touches a real browser. A [`WindowOpener`] produces a
//! [`PopupHandle`]: something to post into and a stream of what the remote
//! side posts back, each tagged with the sender's origin.

use crate::domain::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// A message received from the remote context.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Serialized origin of the sender (`scheme://host[:port]`)
    pub origin: String,
    /// Raw message payload
    pub data: Value,
}

/// An open remote browsing context.
pub trait PopupWindow: Send + Sync {
    /// Post `data` to the window, restricted to `target_origin` (`"*"` for any).
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), TransportError>;

    /// Close the window.
    fn close(&self);

    /// Whether the window has been closed by either side.
    fn is_closed(&self) -> bool;
}

/// A freshly opened window plus its inbound stream.
///
/// The stream ends when the remote side goes away.
pub struct PopupHandle {
    /// Outbound side
    pub window: Arc<dyn PopupWindow>,
    /// Inbound side
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

/// Opens remote contexts.
#[async_trait]
pub trait WindowOpener: Send + Sync {
    /// Open a window at `url`.
    async fn open(&self, url: &Url) -> Result<PopupHandle, TransportError>;
}

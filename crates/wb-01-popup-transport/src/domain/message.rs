//! Cross-window message envelope.
//!
//! Every message carries a unique [`MessageId`]. A reply carries the id of
//! the message it answers in `requestId`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique id of a cross-window message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new random message id (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Out-of-band configuration events exchanged with the popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigEvent {
    /// Popup finished loading and is ready for the handshake
    PopupLoaded,
    /// Popup is closing
    PopupUnload,
    /// Ask the popup which signer protocol the user picked
    #[serde(rename = "selectSignerType")]
    SelectSignerType,
    /// Popup asks for a relay session to pair
    WalletLinkSessionRequest,
    /// Relay session status pushed to the popup
    WalletLinkUpdate,
    /// Any event this side does not know about
    #[serde(other)]
    Unknown,
}

/// A cross-window message.
///
/// Config messages use `event`/`data`; RPC messages use
/// `sender`/`content`/`timestamp`. Unused fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id of this message
    pub id: MessageId,
    /// Id of the message this one answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<MessageId>,
    /// Config event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<ConfigEvent>,
    /// Config payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Sender public key (hex) for RPC messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// RPC payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Creation time of RPC messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    fn empty() -> Self {
        Self {
            id: MessageId::new(),
            request_id: None,
            event: None,
            data: None,
            sender: None,
            content: None,
            timestamp: None,
        }
    }

    /// A config event with optional payload.
    pub fn config(event: ConfigEvent, data: Option<Value>) -> Self {
        Self {
            event: Some(event),
            data,
            ..Self::empty()
        }
    }

    /// A reply to `request_id` carrying `data`.
    pub fn reply(request_id: MessageId, data: Value) -> Self {
        Self {
            request_id: Some(request_id),
            data: Some(data),
            ..Self::empty()
        }
    }

    /// An RPC message from `sender` (hex public key).
    pub fn rpc(sender: impl Into<String>, content: Value) -> Self {
        Self {
            sender: Some(sender.into()),
            content: Some(content),
            timestamp: Some(Utc::now()),
            ..Self::empty()
        }
    }

    /// True if this is the given config event.
    pub fn is_event(&self, event: &ConfigEvent) -> bool {
        self.event.as_ref() == Some(event)
    }
}

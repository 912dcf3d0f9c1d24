//! Relay socket frames.
//!
//! Every frame is a JSON object tagged by `type`, except the bare heartbeat
//! text `"h"` which travels in both directions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bare heartbeat frame.
pub const HEARTBEAT_FRAME: &str = "h";

/// Session metadata keys the relay stores on behalf of the wallet.
pub mod metadata_keys {
    pub const DESTROYED: &str = "__destroyed";
    pub const ETHEREUM_ADDRESS: &str = "EthereumAddress";
    pub const WALLET_USERNAME: &str = "WalletUsername";
    pub const APP_VERSION: &str = "AppVersion";
    pub const CHAIN_ID: &str = "ChainId";
    pub const JSON_RPC_URL: &str = "JsonRpcUrl";
}

/// Event names carried by `PublishEvent` and `Event`.
pub mod event_names {
    pub const WEB3_REQUEST: &str = "Web3Request";
    pub const WEB3_REQUEST_CANCELED: &str = "Web3RequestCanceled";
    pub const WEB3_RESPONSE: &str = "Web3Response";
}

/// Frames sent by this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    HostSession {
        id: u64,
        session_id: String,
        session_key: String,
    },
    IsLinked {
        id: u64,
        session_id: String,
    },
    GetSessionConfig {
        id: u64,
        session_id: String,
    },
    SetSessionConfig {
        id: u64,
        session_id: String,
        metadata: BTreeMap<String, String>,
    },
    PublishEvent {
        id: u64,
        session_id: String,
        event: String,
        /// Encrypted payload
        data: String,
        call_webhook: bool,
    },
}

impl ClientMessage {
    pub fn id(&self) -> u64 {
        match self {
            Self::HostSession { id, .. }
            | Self::IsLinked { id, .. }
            | Self::GetSessionConfig { id, .. }
            | Self::SetSessionConfig { id, .. }
            | Self::PublishEvent { id, .. } => *id,
        }
    }
}

/// Frames sent by the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "OK")]
    Ok { id: u64, session_id: String },
    Fail {
        id: u64,
        session_id: String,
        #[serde(default)]
        error: String,
    },
    #[serde(rename = "IsLinkedOK")]
    IsLinkedOk {
        id: u64,
        session_id: String,
        linked: bool,
        #[serde(default)]
        online_guests: u32,
    },
    Linked {
        session_id: String,
        #[serde(default)]
        online_guests: u32,
    },
    #[serde(rename = "GetSessionConfigOK")]
    GetSessionConfigOk {
        id: u64,
        session_id: String,
        #[serde(default)]
        webhook_id: Option<String>,
        #[serde(default)]
        webhook_url: Option<String>,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    SessionConfigUpdated {
        session_id: String,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    #[serde(rename = "PublishEventOK")]
    PublishEventOk {
        id: u64,
        session_id: String,
        event_id: String,
    },
    Event {
        session_id: String,
        event_id: String,
        event: String,
        /// Encrypted payload
        data: String,
    },
}

impl ServerMessage {
    /// Request id this frame answers, if any.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Ok { id, .. }
            | Self::Fail { id, .. }
            | Self::IsLinkedOk { id, .. }
            | Self::GetSessionConfigOk { id, .. }
            | Self::PublishEventOk { id, .. } => Some(*id),
            Self::Linked { .. } | Self::SessionConfigUpdated { .. } | Self::Event { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_wire_shape() {
        let msg = ClientMessage::PublishEvent {
            id: 3,
            session_id: "s".into(),
            event: event_names::WEB3_REQUEST.into(),
            data: "00ff".into(),
            call_webhook: true,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "PublishEvent",
                "id": 3,
                "sessionId": "s",
                "event": "Web3Request",
                "data": "00ff",
                "callWebhook": true
            })
        );
        assert_eq!(msg.id(), 3);
    }

    #[test]
    fn test_server_frames_parse() {
        let ok: ServerMessage =
            serde_json::from_value(json!({"type": "IsLinkedOK", "id": 2, "sessionId": "s", "linked": false, "onlineGuests": 1}))
                .unwrap();
        assert_eq!(ok.id(), Some(2));
        assert!(matches!(ok, ServerMessage::IsLinkedOk { online_guests: 1, .. }));

        let event: ServerMessage = serde_json::from_value(json!({
            "type": "Event", "sessionId": "s", "eventId": "e1", "event": "Web3Response", "data": "ab"
        }))
        .unwrap();
        assert_eq!(event.id(), None);

        let config: ServerMessage = serde_json::from_value(json!({
            "type": "GetSessionConfigOK", "id": 4, "sessionId": "s",
            "webhookId": null, "webhookUrl": null, "metadata": {"AppVersion": "aa"}
        }))
        .unwrap();
        assert!(matches!(config, ServerMessage::GetSessionConfigOk { ref metadata, .. } if metadata.len() == 1));
    }

    #[test]
    fn test_fail_without_error_text() {
        let fail: ServerMessage =
            serde_json::from_value(json!({"type": "Fail", "id": 9, "sessionId": "s"})).unwrap();
        assert_eq!(
            fail,
            ServerMessage::Fail {
                id: 9,
                session_id: "s".into(),
                error: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"Nope"}"#).is_err());
    }
}

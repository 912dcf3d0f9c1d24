//! SCW RPC payloads carried in [`Message::content`](wb_01_popup_transport::Message).
//!
//! Requests carry either a plaintext `handshake` or an `encrypted` envelope;
//! responses carry either an `encrypted` envelope or a plaintext `failure`.
//! Inside the envelope, a request is `{action, chainId}` and a response is
//! `{result: {value} | {error}, data?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_crypto::EncryptedEnvelope;
use shared_types::{ProviderError, RequestArguments};
use std::collections::BTreeMap;

/// Methods forwarded to the wallet popup.
pub const ALLOWED_METHODS: &[&str] = &[
    "eth_requestAccounts",
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sendRawTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData_v1",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

/// True if `method` may be sent to the popup.
pub fn is_allowed(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}

/// Plaintext handshake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub method: String,
    pub params: Value,
}

/// Request content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestContent {
    Handshake(HandshakeRequest),
    Encrypted(EncryptedEnvelope),
}

/// Response content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseContent {
    Encrypted(EncryptedEnvelope),
    Failure(ProviderError),
}

/// Plaintext sealed inside a request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRequest {
    pub action: RequestArguments,
    pub chain_id: u64,
}

/// Outcome half of a decrypted response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcResult {
    Value(Value),
    Error(ProviderError),
}

/// Side data a wallet may attach to any response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Chain id (decimal string) to RPC URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

/// Plaintext sealed inside a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: RpcResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl RpcResponse {
    /// Successful response.
    pub fn value(value: Value) -> Self {
        Self {
            result: RpcResult::Value(value),
            data: None,
        }
    }

    /// Error response.
    pub fn error(error: ProviderError) -> Self {
        Self {
            result: RpcResult::Error(error),
            data: None,
        }
    }
}

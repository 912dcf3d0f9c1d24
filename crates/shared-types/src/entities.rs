//! # Domain Entities
//!
//! Values that flow between the provider facade and a signer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display metadata of the dApp, forwarded into both handshake protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    /// Application name shown to the user
    pub name: String,
    /// Optional logo URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Chains the dApp supports, preferred first
    #[serde(default)]
    pub chain_ids: Vec<u64>,
}

impl AppMetadata {
    /// Metadata with a name and no logo or chains.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logo_url: None,
            chain_ids: Vec::new(),
        }
    }

    /// The chain a fresh signer starts on.
    pub fn default_chain_id(&self) -> u64 {
        self.chain_ids.first().copied().unwrap_or(1)
    }
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self::new("DApp")
    }
}

/// An EIP-1193 request: an opaque method name with opaque params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    /// JSON-RPC method name
    pub method: String,
    /// Positional or named params
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    /// Request with params.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    /// Request without params.
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Params as a positional array; absent params become an empty array.
    pub fn params_array(&self) -> Vec<Value> {
        match &self.params {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }

    /// Positional param at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&Value> {
        match &self.params {
            Some(Value::Array(items)) => items.get(index),
            Some(other) if index == 0 => Some(other),
            _ => None,
        }
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Format a quantity as `0x`-prefixed hex.
pub fn to_hex_u64(value: u64) -> String {
    format!("0x{:x}", value)
}

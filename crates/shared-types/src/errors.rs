//! # Error Types
//!
//! The provider-facing error shape shared by every signer and transport.
//!
//! Remote-reported errors keep their original code and message. Purely local
//! failures are normalised to [`codes::INTERNAL_ERROR`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// EIP-1193 provider codes and JSON-RPC 2.0 codes.
pub mod codes {
    // EIP-1193 provider errors
    pub const USER_REJECTED_REQUEST: i32 = 4001;
    pub const UNAUTHORIZED: i32 = 4100;
    pub const UNSUPPORTED_METHOD: i32 = 4200;
    pub const DISCONNECTED: i32 = 4900;
    pub const CHAIN_DISCONNECTED: i32 = 4901;
    pub const UNSUPPORTED_CHAIN: i32 = 4902;

    // JSON-RPC 2.0 errors
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // EIP-1474 server errors
    pub const INVALID_INPUT: i32 = -32000;

    /// Standard message for a known code.
    pub fn default_message(code: i32) -> &'static str {
        match code {
            USER_REJECTED_REQUEST => "User rejected the request.",
            UNAUTHORIZED => {
                "The requested method and/or account has not been authorized by the user."
            }
            UNSUPPORTED_METHOD => "The requested method is not supported by this Ethereum provider.",
            DISCONNECTED => "The provider is disconnected from all chains.",
            CHAIN_DISCONNECTED => "The provider is disconnected from the specified chain.",
            UNSUPPORTED_CHAIN => "Unrecognized chain ID.",
            PARSE_ERROR => "Invalid JSON was received by the server.",
            INVALID_REQUEST => "The JSON sent is not a valid Request object.",
            METHOD_NOT_FOUND => "The method does not exist / is not available.",
            INVALID_PARAMS => "Invalid method parameter(s).",
            INTERNAL_ERROR => "Internal JSON-RPC error.",
            INVALID_INPUT => "Missing or invalid parameters.",
            _ => "Unspecified error message.",
        }
    }
}

/// Error surfaced to the dApp, carrying a provider or JSON-RPC code.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderError {
    /// Provider or JSON-RPC error code
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Optional additional data
    pub data: Option<serde_json::Value>,
}

impl ProviderError {
    /// Create a new error. An empty message falls back to the code's default.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            codes::default_message(code).to_string()
        } else {
            message
        };
        Self {
            code,
            message,
            data: None,
        }
    }

    /// Create error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        let mut error = Self::new(code, message);
        error.data = Some(data);
        error
    }

    /// User rejected the request (4001)
    pub fn user_rejected_request(message: impl Into<String>) -> Self {
        Self::new(codes::USER_REJECTED_REQUEST, message)
    }

    /// Session missing or revoked (4100)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(codes::UNAUTHORIZED, message)
    }

    /// Method outside the active signer's allow-list (4200)
    pub fn unsupported_method(message: impl Into<String>) -> Self {
        Self::new(codes::UNSUPPORTED_METHOD, message)
    }

    /// Provider disconnected (4900)
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(codes::DISCONNECTED, message)
    }

    /// Local failure (-32603)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// Invalid parameters (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Method not found (-32601)
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, message)
    }

    /// Missing or invalid input (-32000)
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_INPUT, message)
    }

    /// True for the reserved "unauthorized" code that forces a full reset.
    pub fn is_unauthorized(&self) -> bool {
        self.code == codes::UNAUTHORIZED
    }

    /// Build from a loosely-shaped remote error value `{code?, message?, data?}`.
    pub fn from_remote(value: &serde_json::Value) -> Self {
        let code = value
            .get("code")
            .and_then(|c| c.as_i64())
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(codes::INTERNAL_ERROR);
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default();
        let mut error = Self::new(code, message);
        error.data = value.get("data").cloned();
        error
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl Serialize for ProviderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ProviderError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ProviderError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            code: Option<i32>,
            message: Option<String>,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        let mut error = ProviderError::new(
            helper.code.unwrap_or(codes::INTERNAL_ERROR),
            helper.message.unwrap_or_default(),
        );
        error.data = helper.data;
        Ok(error)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::internal(format!("serialization failed: {}", e))
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Configuration validation errors shared by every crate's config struct.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A URL field is empty or malformed
    #[error("invalid url for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    /// A duration field is zero or out of range
    #[error("invalid duration for {field}: {reason}")]
    InvalidDuration { field: &'static str, reason: String },

    /// Any other invalid value
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_messages() {
        let err = ProviderError::user_rejected_request("");
        assert_eq!(err.code, codes::USER_REJECTED_REQUEST);
        assert_eq!(err.message, "User rejected the request.");

        let err = ProviderError::unsupported_method("eth_foo is not allowed");
        assert_eq!(err.message, "eth_foo is not allowed");
    }

    #[test]
    fn test_error_serialization_omits_empty_data() {
        let err = ProviderError::internal("boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"code": -32603, "message": "boom"}));
    }

    #[test]
    fn test_error_deserialization_with_missing_code() {
        let err: ProviderError =
            serde_json::from_str(r#"{"message":"remote blew up"}"#).unwrap();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
        assert_eq!(err.message, "remote blew up");
    }

    #[test]
    fn test_from_remote_keeps_code() {
        let remote = serde_json::json!({"code": 4100, "message": "revoked", "data": {"x": 1}});
        let err = ProviderError::from_remote(&remote);
        assert!(err.is_unauthorized());
        assert_eq!(err.message, "revoked");
        assert_eq!(err.data.unwrap()["x"], 1);
    }

    #[test]
    fn test_from_serde_error_is_internal() {
        let json_err: Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: ProviderError = json_err.unwrap_err().into();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
    }
}

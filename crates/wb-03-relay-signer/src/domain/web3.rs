//! Web3 request/response payloads exchanged with the wallet app.
//!
//! These travel encrypted inside `PublishEvent` / `Event` frames, wrapped in
//! [`WalletLinkEventData`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::ProviderError;

/// Transaction fields as the wallet app expects them. Amounts are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumTransactionParams {
    pub from_address: String,
    pub to_address: Option<String>,
    pub wei_value: String,
    pub data: String,
    pub nonce: Option<u64>,
    pub gas_price_in_wei: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub gas_limit: Option<String>,
    pub chain_id: u64,
}

/// Requests understood by the wallet app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Web3Request {
    RequestEthereumAccounts {
        app_name: String,
        app_logo_url: Option<String>,
    },
    SignEthereumMessage {
        /// Hex-encoded message
        message: String,
        address: String,
        add_prefix: bool,
        typed_data_json: Option<String>,
    },
    SignEthereumTransaction {
        #[serde(flatten)]
        tx: EthereumTransactionParams,
        should_submit: bool,
    },
    SubmitEthereumTransaction {
        signed_transaction: String,
        chain_id: u64,
    },
    EthereumAddressFromSignedMessage {
        message: String,
        signature: String,
        add_prefix: bool,
    },
    SwitchEthereumChain {
        /// Decimal chain id
        chain_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    AddEthereumChain {
        /// Decimal chain id
        chain_id: String,
        rpc_urls: Vec<String>,
        #[serde(default)]
        icon_urls: Vec<String>,
        #[serde(default)]
        block_explorer_urls: Vec<String>,
        chain_name: String,
        native_currency: Value,
    },
    WatchAsset {
        #[serde(rename = "type")]
        asset_type: String,
        options: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_id: Option<String>,
    },
}

impl Web3Request {
    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::RequestEthereumAccounts { .. } => "requestEthereumAccounts",
            Self::SignEthereumMessage { .. } => "signEthereumMessage",
            Self::SignEthereumTransaction { .. } => "signEthereumTransaction",
            Self::SubmitEthereumTransaction { .. } => "submitEthereumTransaction",
            Self::EthereumAddressFromSignedMessage { .. } => "ethereumAddressFromSignedMessage",
            Self::SwitchEthereumChain { .. } => "switchEthereumChain",
            Self::AddEthereumChain { .. } => "addEthereumChain",
            Self::WatchAsset { .. } => "watchAsset",
        }
    }
}

/// The wallet app's answer: `{method, result}` or `{method, errorMessage, errorCode?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Web3Response {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

impl Web3Response {
    pub fn success(method: impl Into<String>, result: Value) -> Self {
        Self {
            method: method.into(),
            result: Some(result),
            error_message: None,
            error_code: None,
        }
    }

    /// Error response built locally (cancellation, publish failure).
    pub fn error(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            result: None,
            error_message: Some(message.into()),
            error_code: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// The result, or the carried error as a provider error.
    pub fn into_result(self) -> Result<Value, ProviderError> {
        match self.error_message {
            Some(message) => Err(ProviderError::new(
                self.error_code.unwrap_or(shared_types::codes::INTERNAL_ERROR),
                message,
            )),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Decrypted payload of relay events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletLinkEventData {
    Web3Request { id: String, request: Web3Request },
    Web3Response { id: String, response: Web3Response },
    Web3RequestCanceled { id: String },
}

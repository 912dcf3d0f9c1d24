//! Relay-backed signer.
//!
//! Account and chain queries are answered from local state; signing methods
//! are translated into [`Web3Request`]s for the paired wallet app.

use crate::adapters::{HttpEventsApi, TungsteniteConnector};
use crate::domain::{
    relay_storage, EthereumTransactionParams, RelayConfig, RelayError, Web3Request,
};
use crate::ports::{RelaySocketConnector, UnseenEventsApi};
use crate::relay::{RelayListener, WalletLinkRelay};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{
    parse_hex_u64, to_hex_u64, Address, AppMetadata, KeyValueStore, ProviderError,
    ProviderResult, RequestArguments, ScopedStorage, Signer,
};
use std::sync::Arc;
use tracing::{debug, info};

const ADDRESSES_KEY: &str = "Addresses";
const DEFAULT_CHAIN_ID_KEY: &str = "DefaultChainId";
const DEFAULT_JSON_RPC_URL_KEY: &str = "DefaultJsonRpcUrl";

/// Accounts and chain as last reported by the wallet, mirrored to storage.
struct AccountState {
    storage: ScopedStorage,
    addresses: Mutex<Vec<Address>>,
}

impl AccountState {
    fn load(storage: ScopedStorage) -> Self {
        let addresses = storage
            .get_item(ADDRESSES_KEY)
            .map(|joined| {
                joined
                    .split(' ')
                    .filter(|a| !a.is_empty())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            storage,
            addresses: Mutex::new(addresses),
        }
    }

    fn addresses(&self) -> Vec<Address> {
        self.addresses.lock().clone()
    }

    fn selected(&self) -> Option<Address> {
        self.addresses.lock().first().cloned()
    }

    fn chain_id(&self) -> u64 {
        self.storage
            .get_item(DEFAULT_CHAIN_ID_KEY)
            .and_then(|id| id.parse().ok())
            .unwrap_or(1)
    }

    fn json_rpc_url(&self) -> Option<String> {
        self.storage.get_item(DEFAULT_JSON_RPC_URL_KEY)
    }

    fn set_addresses(&self, addresses: &[String]) {
        let normalized: Vec<Address> = addresses.iter().map(|a| a.to_lowercase()).collect();
        let mut current = self.addresses.lock();
        if *current == normalized {
            return;
        }
        self.storage.set_item(ADDRESSES_KEY, &normalized.join(" "));
        info!(accounts = normalized.len(), "Relay accounts changed");
        *current = normalized;
    }

    fn set_provider_info(&self, json_rpc_url: &str, chain_id: u64) {
        self.storage.set_item(DEFAULT_JSON_RPC_URL_KEY, json_rpc_url);
        let previous = self.chain_id();
        self.storage
            .set_item(DEFAULT_CHAIN_ID_KEY, &chain_id.to_string());
        if previous != chain_id {
            info!(chain_id, "Relay chain changed");
        }
    }

    fn ensure_known(&self, address: &str) -> ProviderResult<Address> {
        let address = address.to_lowercase();
        if self.addresses.lock().contains(&address) {
            Ok(address)
        } else {
            Err(ProviderError::invalid_params("Unknown Ethereum address"))
        }
    }

    fn forget(&self) {
        self.addresses.lock().clear();
    }
}

impl RelayListener for AccountState {
    fn accounts_updated(&self, accounts: &[String], _is_disconnect: bool) {
        self.set_addresses(accounts);
    }

    fn chain_updated(&self, json_rpc_url: &str, chain_id: u64) {
        self.set_provider_info(json_rpc_url, chain_id);
    }
}

/// Signer whose wallet lives in a companion app reached through the relay.
pub struct WalletLinkSigner {
    relay: WalletLinkRelay,
    accounts: Arc<AccountState>,
}

impl WalletLinkSigner {
    /// Signer over the given socket and event-store adapters.
    pub fn new(
        config: RelayConfig,
        metadata: AppMetadata,
        store: Arc<dyn KeyValueStore>,
        connector: Arc<dyn RelaySocketConnector>,
        events_api: Arc<dyn UnseenEventsApi>,
    ) -> Result<Self, RelayError> {
        let accounts = Arc::new(AccountState::load(relay_storage(
            &config.link_api_url,
            store.clone(),
        )));
        let relay = WalletLinkRelay::new(
            config,
            metadata,
            store,
            connector,
            events_api,
            accounts.clone(),
        )?;
        Ok(Self { relay, accounts })
    }

    /// Signer talking to a real relay over websocket and HTTPS.
    pub fn connect(
        config: RelayConfig,
        metadata: AppMetadata,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, RelayError> {
        let events_api = Arc::new(HttpEventsApi::new(config.link_api_url.clone())?);
        Self::new(
            config,
            metadata,
            store,
            Arc::new(TungsteniteConnector::new()),
            events_api,
        )
    }

    pub fn relay(&self) -> &WalletLinkRelay {
        &self.relay
    }

    /// Session id and secret, the pairing material shown as a QR code.
    pub fn session_credentials(&self) -> (String, String) {
        let session = self.relay.session();
        (session.id().to_string(), session.secret().to_string())
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.accounts.addresses()
    }

    pub fn chain_id(&self) -> u64 {
        self.accounts.chain_id()
    }

    pub fn json_rpc_url(&self) -> Option<String> {
        self.accounts.json_rpc_url()
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        let cached = self.accounts.addresses();
        if !cached.is_empty() {
            return Ok(cached);
        }
        let result = self.relay.request_ethereum_accounts().await?;
        let accounts: Vec<Address> = serde_json::from_value(result)
            .map_err(|e| ProviderError::internal(format!("accounts received is invalid: {}", e)))?;
        if accounts.is_empty() {
            return Err(ProviderError::internal("accounts received is empty"));
        }
        self.accounts.set_addresses(&accounts);
        Ok(self.accounts.addresses())
    }

    async fn personal_sign(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let message = param_str(args, 0)?;
        let address = self.accounts.ensure_known(param_str(args, 1)?)?;
        Ok(self
            .relay
            .send_request(Web3Request::SignEthereumMessage {
                message: encode_to_hex(message),
                address,
                add_prefix: true,
                typed_data_json: None,
            })
            .await?)
    }

    async fn sign_typed_data(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let (address_index, data_index) = if args.method == "eth_signTypedData_v1" {
            (1, 0)
        } else {
            (0, 1)
        };
        let address = self.accounts.ensure_known(param_str(args, address_index)?)?;
        let raw = args
            .param(data_index)
            .ok_or_else(|| ProviderError::invalid_params("Missing typed data"))?;
        let typed_data = match raw {
            Value::String(text) => serde_json::from_str(text)
                .map_err(|e| ProviderError::invalid_params(format!("Invalid typed data: {}", e)))?,
            other => other.clone(),
        };
        let typed_data_json = serde_json::to_string_pretty(&typed_data)?;

        Ok(self
            .relay
            .send_request(Web3Request::SignEthereumMessage {
                message: encode_to_hex(&typed_data_json),
                address,
                add_prefix: false,
                typed_data_json: Some(typed_data_json),
            })
            .await?)
    }

    async fn ec_recover(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let message = param_str(args, 0)?;
        let signature = param_str(args, 1)?;
        Ok(self
            .relay
            .send_request(Web3Request::EthereumAddressFromSignedMessage {
                message: encode_to_hex(message),
                signature: encode_to_hex(signature),
                add_prefix: args.method == "personal_ecRecover",
            })
            .await?)
    }

    async fn sign_transaction(
        &self,
        args: &RequestArguments,
        should_submit: bool,
    ) -> ProviderResult<Value> {
        let tx = self.prepare_transaction(args.param(0).unwrap_or(&Value::Null))?;
        debug!(should_submit, chain_id = tx.chain_id, "Relaying transaction");
        Ok(self
            .relay
            .send_request(Web3Request::SignEthereumTransaction { tx, should_submit })
            .await?)
    }

    async fn send_raw_transaction(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let signed = param_str(args, 0)?;
        Ok(self
            .relay
            .send_request(Web3Request::SubmitEthereumTransaction {
                signed_transaction: encode_to_hex(signed),
                chain_id: self.accounts.chain_id(),
            })
            .await?)
    }

    async fn switch_chain(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let chain_id = args
            .param(0)
            .and_then(|p| p.get("chainId"))
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .ok_or_else(|| ProviderError::invalid_params("Expected [{ chainId }]"))?;

        let result = self
            .relay
            .send_request(Web3Request::SwitchEthereumChain {
                chain_id: chain_id.to_string(),
                address: self.accounts.selected(),
            })
            .await?;
        let approved = result.get("isApproved").and_then(Value::as_bool) == Some(true);
        match result.get("rpcUrl").and_then(Value::as_str) {
            Some(rpc_url) if approved && !rpc_url.is_empty() => {
                self.accounts.set_provider_info(rpc_url, chain_id)
            }
            _ => {}
        }
        Ok(Value::Null)
    }

    async fn add_chain(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let request = args
            .param(0)
            .ok_or_else(|| ProviderError::invalid_params("Expected [{ chainId, ... }]"))?;
        let rpc_urls: Vec<String> = string_list(request.get("rpcUrls"));
        if rpc_urls.is_empty() {
            return Err(ProviderError::invalid_params("please pass in at least 1 rpcUrl"));
        }
        let chain_name = request
            .get("chainName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProviderError::invalid_params("chainName is a required field"))?;
        let native_currency = request
            .get("nativeCurrency")
            .cloned()
            .ok_or_else(|| ProviderError::invalid_params("nativeCurrency is a required field"))?;
        let chain_id = request
            .get("chainId")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .ok_or_else(|| ProviderError::invalid_params("chainId must be a hex string"))?;

        if chain_id == self.accounts.chain_id() {
            return Ok(Value::Bool(false));
        }

        let outcome = self
            .relay
            .send_request(Web3Request::AddEthereumChain {
                chain_id: chain_id.to_string(),
                rpc_urls: rpc_urls.clone(),
                icon_urls: string_list(request.get("iconUrls")),
                block_explorer_urls: string_list(request.get("blockExplorerUrls")),
                chain_name: chain_name.to_string(),
                native_currency,
            })
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(RelayError::Remote(_)) => return Ok(Value::Bool(false)),
            Err(e) => return Err(e.into()),
        };
        if result.get("isApproved").and_then(Value::as_bool) == Some(true) {
            self.accounts.set_provider_info(&rpc_urls[0], chain_id);
            return Ok(Value::Null);
        }
        Err(ProviderError::internal("unable to add ethereum chain"))
    }

    async fn watch_asset(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let request = args
            .param(0)
            .ok_or_else(|| ProviderError::invalid_params("Type is required"))?;
        let asset_type = request
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::invalid_params("Type is required"))?;
        if asset_type != "ERC20" {
            return Err(ProviderError::invalid_params(format!(
                "Asset of type '{}' is not supported",
                asset_type
            )));
        }
        let options = request
            .get("options")
            .filter(|o| o.is_object())
            .ok_or_else(|| ProviderError::invalid_params("Options are required"))?;
        if options.get("address").and_then(Value::as_str).is_none() {
            return Err(ProviderError::invalid_params("Address is required"));
        }

        let outcome = self
            .relay
            .send_request(Web3Request::WatchAsset {
                asset_type: asset_type.to_string(),
                options: options.clone(),
                chain_id: Some(self.accounts.chain_id().to_string()),
            })
            .await;
        match outcome {
            Ok(result) => Ok(Value::Bool(truthy(&result))),
            Err(RelayError::Remote(_)) => Ok(Value::Bool(false)),
            Err(e) => Err(e.into()),
        }
    }

    fn prepare_transaction(&self, tx: &Value) -> ProviderResult<EthereumTransactionParams> {
        let from_address = match tx.get("from").and_then(Value::as_str) {
            Some(from) => from.to_string(),
            None => self
                .accounts
                .selected()
                .ok_or_else(|| ProviderError::invalid_params("Ethereum address is unavailable"))?,
        };
        let from_address = self.accounts.ensure_known(&from_address)?;

        Ok(EthereumTransactionParams {
            from_address,
            to_address: tx
                .get("to")
                .and_then(Value::as_str)
                .map(str::to_lowercase),
            wei_value: optional_quantity(tx, "value")?.unwrap_or_else(|| "0".to_string()),
            data: tx
                .get("data")
                .and_then(Value::as_str)
                .map(encode_to_hex)
                .unwrap_or_else(|| "0x".to_string()),
            nonce: optional_quantity(tx, "nonce")?
                .map(|n| n.parse::<u64>())
                .transpose()
                .map_err(|_| ProviderError::invalid_params("nonce out of range"))?,
            gas_price_in_wei: optional_quantity(tx, "gasPrice")?,
            max_fee_per_gas: optional_quantity(tx, "maxFeePerGas")?,
            max_priority_fee_per_gas: optional_quantity(tx, "maxPriorityFeePerGas")?,
            gas_limit: optional_quantity(tx, "gas")?,
            chain_id: match optional_quantity(tx, "chainId")? {
                Some(id) => id
                    .parse()
                    .map_err(|_| ProviderError::invalid_params("chainId out of range"))?,
                None => self.accounts.chain_id(),
            },
        })
    }
}

#[async_trait]
impl Signer for WalletLinkSigner {
    async fn handshake(&self) -> ProviderResult<Vec<Address>> {
        self.request_accounts().await
    }

    async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        match args.method.as_str() {
            "eth_accounts" => Ok(json!(self.accounts.addresses())),
            "eth_coinbase" => Ok(self
                .accounts
                .selected()
                .map(Value::String)
                .unwrap_or(Value::Null)),
            "net_version" => Ok(json!(self.accounts.chain_id().to_string())),
            "eth_chainId" => Ok(json!(to_hex_u64(self.accounts.chain_id()))),
            "eth_requestAccounts" => Ok(json!(self.request_accounts().await?)),
            "eth_ecRecover" | "personal_ecRecover" => self.ec_recover(&args).await,
            "personal_sign" => self.personal_sign(&args).await,
            "eth_signTransaction" => self.sign_transaction(&args, false).await,
            "eth_sendTransaction" => self.sign_transaction(&args, true).await,
            "eth_sendRawTransaction" => self.send_raw_transaction(&args).await,
            "eth_signTypedData_v1" | "eth_signTypedData_v3" | "eth_signTypedData_v4"
            | "eth_signTypedData" => self.sign_typed_data(&args).await,
            "wallet_switchEthereumChain" => self.switch_chain(&args).await,
            "wallet_addEthereumChain" => self.add_chain(&args).await,
            "wallet_watchAsset" => self.watch_asset(&args).await,
            method => Err(ProviderError::unsupported_method(format!(
                "Method {} is not supported by the relay signer",
                method
            ))),
        }
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        // Cleared first so the replacement session persists.
        self.accounts.storage.clear();
        self.accounts.forget();
        self.relay.reset_and_reload().await;
        info!("Relay signer disconnected");
        Ok(())
    }
}

fn param_str(args: &RequestArguments, index: usize) -> ProviderResult<&str> {
    args.param(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_params(format!("Expected a string at params[{}]", index)))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// `0x`-prefixed hex stays as is (lowercased); anything else is UTF-8 encoded.
fn encode_to_hex(value: &str) -> String {
    match value.strip_prefix("0x") {
        Some(digits) if digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            format!("0x{}", digits.to_lowercase())
        }
        _ => format!("0x{}", hex::encode(value.as_bytes())),
    }
}

/// Decimal string of a hex, decimal or numeric quantity.
fn quantity_to_decimal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::String(s) => match s.strip_prefix("0x") {
            Some("") => Some("0".to_string()),
            Some(digits) => u128::from_str_radix(digits, 16).ok().map(|n| n.to_string()),
            None => s.parse::<u128>().ok().map(|n| n.to_string()),
        },
        _ => None,
    }
}

fn optional_quantity(tx: &Value, field: &str) -> ProviderResult<Option<String>> {
    match tx.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => quantity_to_decimal(value)
            .map(Some)
            .ok_or_else(|| ProviderError::invalid_params(format!("Invalid {} quantity", field))),
    }
}

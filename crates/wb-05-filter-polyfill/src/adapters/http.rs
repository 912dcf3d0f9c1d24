//! JSON-RPC over HTTP.

use crate::domain::FilterError;
use crate::ports::RpcClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::ProviderError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// [`RpcClient`] posting to a node's HTTP endpoint.
pub struct HttpRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, FilterError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FilterError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn send_raw(&self, method: &str, params: Value) -> Result<Value, FilterError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(method, id, "JSON-RPC call");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FilterError::Transport(format!("Cannot connect to {}", self.url))
                } else {
                    FilterError::Transport(e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(FilterError::Transport(format!(
                "{} returned {}",
                method,
                response.status()
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| FilterError::UnexpectedResponse(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(FilterError::Rpc(match error.data {
                Some(data) => ProviderError::with_data(error.code, error.message, data),
                None => ProviderError::new(error.code, error.message),
            }));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

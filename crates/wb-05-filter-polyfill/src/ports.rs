//! Outbound port: a stateless JSON-RPC endpoint.

use crate::domain::FilterError;
use async_trait::async_trait;
use serde_json::Value;

/// Sends one JSON-RPC call and returns its `result`.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn send_raw(&self, method: &str, params: Value) -> Result<Value, FilterError>;
}

//! Simulated chain, for tests and offline embedding.

use crate::domain::{BlockTag, FilterError};
use crate::ports::RpcClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{parse_hex_u64, to_hex_u64, ProviderError};

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    logs: Vec<Value>,
    calls: Vec<String>,
}

/// A chain that answers `eth_blockNumber`, `eth_getBlockByNumber` and
/// `eth_getLogs` from memory. Block `n` has hash `0x{n:064x}`.
#[derive(Debug, Default)]
pub struct MemoryChain {
    state: Mutex<ChainState>,
}

impl MemoryChain {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                height,
                ..ChainState::default()
            }),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().height = height;
    }

    /// Add a log at `block`. The log is returned by `eth_getLogs` ranges
    /// covering that block.
    pub fn push_log(&self, block: u64, data: &str) {
        self.state.lock().logs.push(json!({
            "blockNumber": to_hex_u64(block),
            "data": data,
        }));
    }

    /// Methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|m| *m == method).count()
    }

    pub fn block_hash(number: u64) -> String {
        format!("0x{:064x}", number)
    }
}

fn resolve(tag: BlockTag, height: u64) -> u64 {
    tag.number().unwrap_or(height)
}

#[async_trait]
impl RpcClient for MemoryChain {
    async fn send_raw(&self, method: &str, params: Value) -> Result<Value, FilterError> {
        let mut state = self.state.lock();
        state.calls.push(method.to_string());
        match method {
            "eth_blockNumber" => Ok(json!(to_hex_u64(state.height))),
            "eth_getBlockByNumber" => {
                let number = params
                    .get(0)
                    .and_then(Value::as_str)
                    .and_then(parse_hex_u64)
                    .ok_or_else(|| FilterError::InvalidParams("block number".into()))?;
                if number > state.height {
                    return Ok(Value::Null);
                }
                Ok(json!({ "number": to_hex_u64(number), "hash": Self::block_hash(number) }))
            }
            "eth_getLogs" => {
                let filter = params.get(0).cloned().unwrap_or(Value::Null);
                let from = resolve(BlockTag::parse(filter.get("fromBlock"))?, state.height);
                let to = resolve(BlockTag::parse(filter.get("toBlock"))?, state.height);
                let logs: Vec<Value> = state
                    .logs
                    .iter()
                    .filter(|log| {
                        log["blockNumber"]
                            .as_str()
                            .and_then(parse_hex_u64)
                            .is_some_and(|n| n >= from && n <= to)
                    })
                    .cloned()
                    .collect();
                Ok(Value::Array(logs))
            }
            other => Err(FilterError::Rpc(ProviderError::method_not_found(format!(
                "the method {} does not exist/is not available",
                other
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logs_by_range() {
        let chain = MemoryChain::new(10);
        chain.push_log(3, "0x03");
        chain.push_log(8, "0x08");
        let logs = chain
            .send_raw("eth_getLogs", json!([{"fromBlock": "0x4", "toBlock": "latest"}]))
            .await
            .unwrap();
        assert_eq!(logs.as_array().unwrap().len(), 1);
        assert_eq!(logs[0]["data"], "0x08");
    }

    #[tokio::test]
    async fn test_blocks_beyond_head_are_null() {
        let chain = MemoryChain::new(2);
        let block = chain
            .send_raw("eth_getBlockByNumber", json!(["0x2", false]))
            .await
            .unwrap();
        assert_eq!(block["hash"], MemoryChain::block_hash(2));
        let missing = chain
            .send_raw("eth_getBlockByNumber", json!(["0x3", false]))
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);
        assert_eq!(chain.call_count("eth_getBlockByNumber"), 2);
    }
}

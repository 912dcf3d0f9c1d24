//! Filter emulation over a stateless RPC endpoint.
//!
//! Each filter keeps a cursor: the next block it has not reported yet.
//! Polling asks the node for the range `cursor..=head` and moves the cursor
//! past whatever it returned.

use crate::domain::{BlockTag, FilterConfig, FilterError, FilterKind, FilterResponse, LogFilter};
use crate::ports::RpcClient;
use dashmap::DashMap;
use futures::future::try_join_all;
use serde_json::{json, Value};
use shared_types::{parse_hex_u64, to_hex_u64, ProviderError, ProviderResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct FilterEntry {
    kind: FilterKind,
    cursor: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct HeightCache {
    height: Option<u64>,
    fetched_at: Option<Instant>,
}

/// Stateful `eth_*Filter*` emulation.
pub struct FilterPolyfill {
    rpc: Arc<dyn RpcClient>,
    config: FilterConfig,
    next_id: AtomicU64,
    filters: DashMap<u64, FilterEntry>,
    height: tokio::sync::Mutex<HeightCache>,
}

impl FilterPolyfill {
    pub fn new(rpc: Arc<dyn RpcClient>) -> Self {
        Self::with_config(rpc, FilterConfig::default())
    }

    pub fn with_config(rpc: Arc<dyn RpcClient>, config: FilterConfig) -> Self {
        Self {
            rpc,
            config,
            next_id: AtomicU64::new(1),
            filters: DashMap::new(),
            height: tokio::sync::Mutex::new(HeightCache::default()),
        }
    }

    /// Live filters, expired ones excluded.
    pub fn filter_count(&self) -> usize {
        self.sweep_expired();
        self.filters.len()
    }

    /// Dispatch one of the six filter methods, answering in the
    /// `{result}` / `{error}` shape.
    pub async fn handle_request(&self, method: &str, params: Option<&Value>) -> ProviderResult<Value> {
        let first = params.and_then(|p| p.get(0));
        let response = match method {
            "eth_newFilter" => {
                let param = first.cloned().unwrap_or_else(|| json!({}));
                FilterResponse::Result(json!(self.new_filter(&param).await?))
            }
            "eth_newBlockFilter" => FilterResponse::Result(json!(self.new_block_filter().await?)),
            "eth_newPendingTransactionFilter" => {
                FilterResponse::Result(json!(self.new_pending_transaction_filter().await?))
            }
            "eth_uninstallFilter" => {
                FilterResponse::Result(json!(self.uninstall_filter(filter_id_param(first)?)))
            }
            "eth_getFilterChanges" => self.get_filter_changes(filter_id_param(first)?).await?,
            "eth_getFilterLogs" => self.get_filter_logs(filter_id_param(first)?).await?,
            other => {
                return Err(ProviderError::method_not_found(format!(
                    "the method {} does not exist/is not available",
                    other
                )))
            }
        };
        Ok(response.to_value())
    }

    /// Install a log filter; returns its hex id.
    pub async fn new_filter(&self, param: &Value) -> Result<String, FilterError> {
        let filter = LogFilter::from_param(param)?;
        let start = filter.from_block;
        self.install(FilterKind::Log(filter), start).await
    }

    pub async fn new_block_filter(&self) -> Result<String, FilterError> {
        self.install(FilterKind::Block, BlockTag::Latest).await
    }

    pub async fn new_pending_transaction_filter(&self) -> Result<String, FilterError> {
        self.install(FilterKind::PendingTransaction, BlockTag::Latest).await
    }

    /// Always true, whether or not the filter existed.
    pub fn uninstall_filter(&self, filter_id: &str) -> bool {
        if let Some(id) = parse_hex_u64(filter_id) {
            if self.filters.remove(&id).is_some() {
                info!(filter_id = id, "Filter uninstalled");
            }
        }
        true
    }

    /// Everything new since the last poll of `filter_id`.
    pub async fn get_filter_changes(&self, filter_id: &str) -> Result<FilterResponse, FilterError> {
        let Some((id, entry)) = self.touch(filter_id) else {
            return Ok(FilterResponse::not_found());
        };
        match &entry.kind {
            FilterKind::Log(filter) => self.log_filter_changes(id, filter, entry.cursor).await,
            FilterKind::Block => self.block_filter_changes(id, entry.cursor).await,
            FilterKind::PendingTransaction => Ok(FilterResponse::empty()),
        }
    }

    /// Every log matching a log filter's original range.
    pub async fn get_filter_logs(&self, filter_id: &str) -> Result<FilterResponse, FilterError> {
        let filter = match self.touch(filter_id) {
            Some((_, FilterEntry { kind: FilterKind::Log(filter), .. })) => filter,
            _ => return Ok(FilterResponse::not_found()),
        };
        let logs = self
            .rpc
            .send_raw("eth_getLogs", json!([filter.to_param()]))
            .await?;
        Ok(FilterResponse::Result(logs))
    }

    /// Current chain height. Fetched at most once per throttle interval;
    /// concurrent callers wait for the same fetch.
    pub async fn current_block_height(&self) -> Result<u64, FilterError> {
        let mut cache = self.height.lock().await;
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() <= self.config.block_height_throttle());
        if let (true, Some(height)) = (fresh, cache.height) {
            return Ok(height);
        }

        let result = self.rpc.send_raw("eth_blockNumber", json!([])).await?;
        let height = result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| FilterError::UnexpectedResponse(result.to_string()))?;
        cache.height = Some(height);
        cache.fetched_at = Some(Instant::now());
        Ok(height)
    }

    async fn install(&self, kind: FilterKind, start: BlockTag) -> Result<String, FilterError> {
        self.sweep_expired();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let height = self.current_block_height().await?;
        let cursor = start.number().map_or(height, |n| n.max(height));

        info!(filter_id = id, kind = kind.label(), cursor, "Filter installed");
        self.filters.insert(
            id,
            FilterEntry {
                kind,
                cursor,
                expires_at: Instant::now() + self.config.filter_timeout(),
            },
        );
        Ok(to_hex_u64(id))
    }

    /// Look up a live filter and push its expiry out.
    fn touch(&self, filter_id: &str) -> Option<(u64, FilterEntry)> {
        let id = parse_hex_u64(filter_id)?;
        let now = Instant::now();
        let mut entry = self.filters.get_mut(&id)?;
        if entry.expires_at <= now {
            drop(entry);
            self.expire(id);
            return None;
        }
        entry.expires_at = now + self.config.filter_timeout();
        Some((id, entry.value().clone()))
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .filters
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in expired {
            self.expire(id);
        }
    }

    fn expire(&self, id: u64) {
        if self
            .filters
            .remove_if(&id, |_, entry| entry.expires_at <= Instant::now())
            .is_some()
        {
            info!(filter_id = id, "Filter timed out");
        }
    }

    fn advance(&self, id: u64, from: u64, to: u64) {
        if let Some(mut entry) = self.filters.get_mut(&id) {
            if entry.cursor == from {
                debug!(filter_id = id, from, to, "Moving filter cursor");
                entry.cursor = to;
            }
        }
    }

    async fn log_filter_changes(
        &self,
        id: u64,
        filter: &LogFilter,
        cursor: u64,
    ) -> Result<FilterResponse, FilterError> {
        let height = self.current_block_height().await?;
        if cursor > height {
            return Ok(FilterResponse::empty());
        }
        if filter.to_block.number().is_some_and(|to| cursor > to) {
            return Ok(FilterResponse::empty());
        }

        let to = filter.to_block.number().unwrap_or(height);
        debug!(filter_id = id, from = cursor, to, "Fetching logs");
        let logs = self
            .rpc
            .send_raw(
                "eth_getLogs",
                json!([filter.range_param(BlockTag::Number(cursor), BlockTag::Number(to))]),
            )
            .await?;

        if let Some(entries) = logs.as_array() {
            let highest = entries
                .iter()
                .map(|log| {
                    log.get("blockNumber")
                        .and_then(Value::as_str)
                        .and_then(parse_hex_u64)
                        .unwrap_or(0)
                })
                .max()
                .unwrap_or(0);
            if highest > cursor {
                self.advance(id, cursor, highest + 1);
            }
        }
        Ok(FilterResponse::Result(logs))
    }

    async fn block_filter_changes(&self, id: u64, cursor: u64) -> Result<FilterResponse, FilterError> {
        let height = self.current_block_height().await?;
        if cursor > height {
            return Ok(FilterResponse::empty());
        }

        debug!(filter_id = id, from = cursor, to = height, "Fetching block hashes");
        let blocks = try_join_all((cursor..=height).map(|n| self.block_hash(n))).await?;
        let hashes: Vec<String> = blocks.into_iter().flatten().collect();
        self.advance(id, cursor, cursor + hashes.len() as u64);
        Ok(FilterResponse::Result(json!(hashes)))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>, FilterError> {
        let block = self
            .rpc
            .send_raw("eth_getBlockByNumber", json!([to_hex_u64(number), false]))
            .await?;
        Ok(block
            .get("hash")
            .and_then(Value::as_str)
            .filter(|hash| !hash.is_empty())
            .map(str::to_string))
    }
}

fn filter_id_param(value: Option<&Value>) -> ProviderResult<&str> {
    value
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_params("Expected a filter id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryChain;
    use std::time::Duration;

    fn polyfill(height: u64) -> (FilterPolyfill, Arc<MemoryChain>) {
        let chain = Arc::new(MemoryChain::new(height));
        (FilterPolyfill::new(chain.clone()), chain)
    }

    fn result(response: FilterResponse) -> Value {
        match response {
            FilterResponse::Result(value) => value,
            FilterResponse::Error(e) => panic!("unexpected error {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_first_id_is_two() {
        let (polyfill, _) = polyfill(10);
        assert_eq!(polyfill.new_block_filter().await.unwrap(), "0x2");
        assert_eq!(polyfill.new_filter(&json!({})).await.unwrap(), "0x3");
        assert_eq!(polyfill.new_pending_transaction_filter().await.unwrap(), "0x4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cursor_moves_past_highest_block() {
        let (polyfill, chain) = polyfill(10);
        let id = polyfill.new_filter(&json!({"fromBlock": "0x5"})).await.unwrap();

        chain.push_log(11, "0x0b");
        chain.push_log(13, "0x0d");
        chain.set_height(14);
        tokio::time::advance(Duration::from_secs(2)).await;

        let logs = result(polyfill.get_filter_changes(&id).await.unwrap());
        assert_eq!(logs.as_array().unwrap().len(), 2);

        // Next poll starts at 14; nothing there.
        tokio::time::advance(Duration::from_secs(2)).await;
        let logs = result(polyfill.get_filter_changes(&id).await.unwrap());
        assert_eq!(logs, json!([]));
    }

    #[tokio::test]
    async fn test_initial_cursor_takes_later_start_block() {
        let (polyfill, chain) = polyfill(10);
        chain.push_log(12, "0x0c");
        let id = polyfill.new_filter(&json!({"fromBlock": "0x14"})).await.unwrap();
        // Cursor 20 is past the head, so nothing is fetched.
        assert_eq!(result(polyfill.get_filter_changes(&id).await.unwrap()), json!([]));
        assert_eq!(chain.call_count("eth_getLogs"), 0);
    }

    #[tokio::test]
    async fn test_cursor_past_to_block_is_empty() {
        let (polyfill, chain) = polyfill(10);
        chain.push_log(10, "0x0a");
        let id = polyfill
            .new_filter(&json!({"fromBlock": "earliest", "toBlock": "0x4"}))
            .await
            .unwrap();
        assert_eq!(result(polyfill.get_filter_changes(&id).await.unwrap()), json!([]));
        assert_eq!(chain.call_count("eth_getLogs"), 0);

        // The original range is still available in full.
        let all = result(polyfill.get_filter_logs(&id).await.unwrap());
        assert_eq!(all, json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_filter_returns_new_hashes() {
        let (polyfill, chain) = polyfill(5);
        let id = polyfill.new_block_filter().await.unwrap();

        chain.set_height(7);
        tokio::time::advance(Duration::from_secs(2)).await;
        let hashes = result(polyfill.get_filter_changes(&id).await.unwrap());
        assert_eq!(
            hashes,
            json!([
                MemoryChain::block_hash(5),
                MemoryChain::block_hash(6),
                MemoryChain::block_hash(7)
            ])
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(result(polyfill.get_filter_changes(&id).await.unwrap()), json!([]));
    }

    #[tokio::test]
    async fn test_pending_filter_always_empty() {
        let (polyfill, chain) = polyfill(5);
        let id = polyfill.new_pending_transaction_filter().await.unwrap();
        chain.set_height(9);
        assert_eq!(result(polyfill.get_filter_changes(&id).await.unwrap()), json!([]));
    }

    #[tokio::test]
    async fn test_unknown_and_uninstalled_filters() {
        let (polyfill, _) = polyfill(5);
        assert_eq!(
            polyfill.get_filter_changes("0x99").await.unwrap(),
            FilterResponse::not_found()
        );

        let id = polyfill.new_filter(&json!({})).await.unwrap();
        assert!(polyfill.uninstall_filter(&id));
        assert!(polyfill.uninstall_filter(&id));
        assert_eq!(
            polyfill.get_filter_changes(&id).await.unwrap(),
            FilterResponse::not_found()
        );
        assert_eq!(
            polyfill.get_filter_logs(&id).await.unwrap(),
            FilterResponse::not_found()
        );
    }

    #[tokio::test]
    async fn test_filter_logs_of_block_filter_not_found() {
        let (polyfill, _) = polyfill(5);
        let id = polyfill.new_block_filter().await.unwrap();
        assert_eq!(
            polyfill.get_filter_logs(&id).await.unwrap(),
            FilterResponse::not_found()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_expire_after_inactivity() {
        let (polyfill, _) = polyfill(5);
        let idle = polyfill.new_block_filter().await.unwrap();
        let polled = polyfill.new_block_filter().await.unwrap();

        tokio::time::advance(Duration::from_secs(200)).await;
        polyfill.get_filter_changes(&polled).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(
            polyfill.get_filter_changes(&idle).await.unwrap(),
            FilterResponse::not_found()
        );
        assert_ne!(
            polyfill.get_filter_changes(&polled).await.unwrap(),
            FilterResponse::not_found()
        );
        assert_eq!(polyfill.filter_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_height_is_throttled() {
        let (polyfill, chain) = polyfill(5);
        for _ in 0..3 {
            polyfill.new_block_filter().await.unwrap();
        }
        assert_eq!(chain.call_count("eth_blockNumber"), 1);

        tokio::time::advance(Duration::from_millis(1500)).await;
        polyfill.current_block_height().await.unwrap();
        assert_eq!(chain.call_count("eth_blockNumber"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_height_requests_share_fetch() {
        let (polyfill, chain) = polyfill(5);
        let (a, b, c) = tokio::join!(
            polyfill.current_block_height(),
            polyfill.current_block_height(),
            polyfill.current_block_height()
        );
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (5, 5, 5));
        assert_eq!(chain.call_count("eth_blockNumber"), 1);
    }

    #[tokio::test]
    async fn test_handle_request_shapes() {
        let (polyfill, _) = polyfill(5);
        let created = polyfill
            .handle_request("eth_newFilter", Some(&json!([{"fromBlock": "latest"}])))
            .await
            .unwrap();
        assert_eq!(created, json!({"result": "0x2"}));

        let removed = polyfill
            .handle_request("eth_uninstallFilter", Some(&json!(["0x2"])))
            .await
            .unwrap();
        assert_eq!(removed, json!({"result": true}));

        let missing = polyfill
            .handle_request("eth_getFilterChanges", Some(&json!(["0x2"])))
            .await
            .unwrap();
        assert_eq!(
            missing,
            json!({"error": {"code": -32000, "message": "filter not found"}})
        );

        let err = polyfill
            .handle_request("eth_newFilter", Some(&json!([{"fromBlock": "safe"}])))
            .await
            .unwrap_err();
        assert_eq!(err.code, shared_types::codes::INVALID_PARAMS);

        let err = polyfill.handle_request("eth_getLogs", None).await.unwrap_err();
        assert_eq!(err.code, shared_types::codes::METHOD_NOT_FOUND);
    }
}

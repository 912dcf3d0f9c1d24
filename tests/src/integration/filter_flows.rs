//! Filter polyfill serving a dApp that polls a growing chain.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use wb_05_filter_polyfill::{FilterConfig, FilterPolyfill, MemoryChain};

    fn polyfill(chain: Arc<MemoryChain>, config: FilterConfig) -> FilterPolyfill {
        wb_telemetry::init_test_logging();
        FilterPolyfill::with_config(chain, config)
    }

    async fn call(polyfill: &FilterPolyfill, method: &str, params: Value) -> Value {
        polyfill.handle_request(method, Some(&params)).await.unwrap()
    }

    async fn next_block(chain: &MemoryChain, height: u64) {
        chain.set_height(height);
        tokio::time::advance(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_session() {
        let chain = Arc::new(MemoryChain::new(100));
        let polyfill = polyfill(chain.clone(), FilterConfig::default());

        let logs_id = call(&polyfill, "eth_newFilter", json!([{"fromBlock": "earliest", "address": "0xabc"}])).await;
        let blocks_id = call(&polyfill, "eth_newBlockFilter", json!([])).await;
        let logs_id = logs_id["result"].clone();
        let blocks_id = blocks_id["result"].clone();
        assert_eq!(logs_id, json!("0x2"));
        assert_eq!(blocks_id, json!("0x3"));

        chain.push_log(101, "0x65");
        next_block(&chain, 101).await;
        let changes = call(&polyfill, "eth_getFilterChanges", json!([logs_id])).await;
        assert_eq!(changes["result"].as_array().unwrap().len(), 1);
        let hashes = call(&polyfill, "eth_getFilterChanges", json!([blocks_id])).await;
        assert_eq!(
            hashes,
            json!({"result": [MemoryChain::block_hash(100), MemoryChain::block_hash(101)]})
        );

        // Nothing new until the chain grows again.
        tokio::time::advance(Duration::from_secs(2)).await;
        let changes = call(&polyfill, "eth_getFilterChanges", json!([logs_id])).await;
        assert_eq!(changes, json!({"result": []}));

        chain.push_log(103, "0x67");
        next_block(&chain, 103).await;
        let changes = call(&polyfill, "eth_getFilterChanges", json!([logs_id])).await;
        assert_eq!(changes["result"][0]["data"], "0x67");

        let all = call(&polyfill, "eth_getFilterLogs", json!([logs_id])).await;
        assert_eq!(all["result"].as_array().unwrap().len(), 2);

        assert_eq!(
            call(&polyfill, "eth_uninstallFilter", json!([logs_id])).await,
            json!({"result": true})
        );
        assert_eq!(
            call(&polyfill, "eth_getFilterChanges", json!([logs_id])).await,
            json!({"error": {"code": -32000, "message": "filter not found"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_filters_expire_but_polled_ones_stay() {
        let chain = Arc::new(MemoryChain::new(1));
        let config = FilterConfig {
            filter_timeout_ms: 10_000,
            ..FilterConfig::default()
        };
        let polyfill = polyfill(chain, config);
        let idle = call(&polyfill, "eth_newPendingTransactionFilter", json!([])).await["result"].clone();
        let busy = call(&polyfill, "eth_newBlockFilter", json!([])).await["result"].clone();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(6)).await;
            let response = call(&polyfill, "eth_getFilterChanges", json!([busy])).await;
            assert!(response.get("result").is_some());
        }

        assert!(call(&polyfill, "eth_getFilterChanges", json!([idle])).await.get("error").is_some());
        assert_eq!(polyfill.filter_count(), 1);
    }
}

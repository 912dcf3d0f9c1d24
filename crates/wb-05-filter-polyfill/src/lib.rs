//! # WB-05 Filter Polyfill
//!
//! Emulates node-side filters for endpoints that do not keep them.
//!
//! ```text
//! eth_newFilter / eth_newBlockFilter / eth_newPendingTransactionFilter
//!        │  id = 0x2, 0x3, ...   cursor = max(head, fromBlock)
//!        ▼
//!   filter table ── 5 min idle ──► dropped
//!        │
//! eth_getFilterChanges
//!        ├─ log:     eth_getLogs(cursor..=min(head, toBlock)), cursor = highest + 1
//!        ├─ block:   eth_getBlockByNumber(cursor..=head).hash, cursor += count
//!        └─ pending: []
//!
//! head = eth_blockNumber, at most once per second
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod polyfill;
pub mod ports;

pub use adapters::{HttpRpcClient, MemoryChain};
pub use domain::{BlockTag, FilterConfig, FilterError, FilterKind, FilterResponse, LogFilter};
pub use polyfill::FilterPolyfill;
pub use ports::RpcClient;

//! [`RpcClient`](crate::ports::RpcClient) implementations.

pub mod http;
pub mod memory;

pub use http::HttpRpcClient;
pub use memory::MemoryChain;

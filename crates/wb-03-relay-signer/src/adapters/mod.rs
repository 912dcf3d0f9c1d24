//! Adapters for the relay ports.

pub mod http_events;
pub mod memory;
pub mod ws_socket;

pub use http_events::HttpEventsApi;
pub use memory::{MemoryEventsApi, MemorySocketConnector, ServerSocket};
pub use ws_socket::TungsteniteConnector;

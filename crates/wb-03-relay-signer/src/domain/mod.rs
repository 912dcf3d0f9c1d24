//! Relay domain: session material, config, wire frames and web3 payloads.

pub mod config;
pub mod error;
pub mod messages;
pub mod session;
pub mod web3;

pub use config::{RelayConfig, DEFAULT_LINK_API_URL};
pub use error::RelayError;
pub use messages::{event_names, metadata_keys, ClientMessage, ServerMessage, HEARTBEAT_FRAME};
pub use session::{relay_storage, RelaySession};
pub use web3::{EthereumTransactionParams, WalletLinkEventData, Web3Request, Web3Response};

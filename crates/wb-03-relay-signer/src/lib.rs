//! # WB-03 Relay Signer
//!
//! Signs through a wallet app paired over the WalletLink relay. Both peers
//! join a session on a cloud websocket server; the server only ever sees
//! ciphertext keyed by the session secret shared through a QR code.
//!
//! ```text
//!  WalletLinkSigner ── local: eth_accounts, eth_chainId, ...
//!        │ Web3Request
//!        ▼
//!  WalletLinkRelay ─── callbacks by correlation id, session reset
//!        │ PublishEvent{data: encrypt(WEB3_REQUEST)}
//!        ▼
//!  RelayConnection ─── HostSession ─► IsLinked ─► GetSessionConfig
//!        │  heartbeat "h" every 10s, reconnect after 5s
//!        ▼
//!  RelaySocketConnector (websocket)      UnseenEventsApi (HTTPS)
//! ```
//!
//! Frames queued before authentication are flushed once `HostSession` is
//! acknowledged; event publishing additionally waits for a linked wallet.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod connection;
pub mod domain;
pub mod ports;
pub mod relay;
pub mod signer;

pub use adapters::{HttpEventsApi, MemoryEventsApi, MemorySocketConnector, ServerSocket, TungsteniteConnector};
pub use connection::{ConnectionEvent, ConnectionState, RelayConnection};
pub use domain::{
    RelayConfig, RelayError, RelaySession, WalletLinkEventData, Web3Request, Web3Response,
    DEFAULT_LINK_API_URL,
};
pub use ports::{RelaySocketConnector, SocketHandle, UnseenEvent, UnseenEventsApi};
pub use relay::{RelayListener, WalletLinkRelay, Web3Handle};
pub use signer::WalletLinkSigner;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

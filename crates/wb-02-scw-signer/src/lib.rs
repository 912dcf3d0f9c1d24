//! # WB-02 SCW Signer
//!
//! Signs through the wallet popup. The first exchange is a plaintext
//! handshake carrying this side's P-256 public key; the reply carries the
//! wallet's. Every later request is sealed under the ECDH-derived
//! AES-256-GCM key.
//!
//! ```text
//! request(args)
//!   │  allow-list check ──────────────► 4200
//!   │  shared secret? ────────────────► 4100
//!   ▼
//! {action, chainId} ─► encrypt ─► Message{sender, content:{encrypted}}
//!                                        │ PopupTransport::post_message_and_wait
//!                                        ▼
//! value | error ◄─ decrypt ◄─ Message{requestId, content:{encrypted|failure}}
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod key_manager;
pub mod messages;
pub mod signer;

pub use error::ScwError;
pub use key_manager::ScwKeyManager;
pub use messages::{is_allowed, RpcResponse, RpcResult, ALLOWED_METHODS};
pub use signer::{Chain, ScwSigner};

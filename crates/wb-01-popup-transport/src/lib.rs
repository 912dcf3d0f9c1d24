//! # WB-01 Popup Transport
//!
//! Request/response messaging with a wallet popup the dApp does not control.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      PopupTransport                          │
//! │                                                              │
//! │  post_message_and_wait ──► PendingRequestStore (by id)       │
//! │          │                          ▲                        │
//! │          ▼                          │ requestId              │
//! │   PopupWindow::post_message    dispatch task ◄── inbound     │
//! │                                     │          (origin check)│
//! │                                     ├──► on_message listeners│
//! │                                     └──► config event stream │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Disconnected -> connect() -> Connecting -> PopupLoaded + reply ->
//! Connected -> (PopupUnload | window closed | disconnect()) -> Disconnected`
//!
//! Disconnecting rejects every pending request with code 4001 and cancels
//! every listener.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{ChannelWindowOpener, RemoteWindow};
pub use domain::{
    ConfigEvent, Message, MessageId, PendingRequestStore, PopupConfig, TransportError,
};
pub use ports::{InboundMessage, PopupHandle, PopupWindow, WindowOpener};
pub use service::{PopupTransport, TransportState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

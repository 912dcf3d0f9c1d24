//! # WB-04 Signer Selector
//!
//! One-time negotiation of the signing protocol, remembered across sessions.
//!
//! ```text
//! eth_requestAccounts
//!   │ remembered SignerType? ──yes──► rebuild signer ──► eth_requestAccounts
//!   │ no
//!   ▼
//! popup: {event: selectSignerType, data: preference} ─► "scw" | "walletlink"
//!   │
//!   ▼
//! create_signer ─► handshake ─► store SignerType
//!
//! any 4100 from a signer ─► forget SignerType + signer keys ─► disconnect
//! ```
//!
//! The choice lives under `-CBWSDK:SignerConfigurator:SignerType`.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod selector;
pub mod signer;
pub mod signer_type;

pub use error::SelectorError;
pub use selector::{RelaySetup, SignerSelector};
pub use signer::Signer;
pub use signer_type::{Preference, SignerType, WalletOptions};

//! # Shared Types Crate
//!
//! Types used by every bridge crate.
//!
//! ## Contents
//!
//! - **errors**: `ProviderError` with EIP-1193 / JSON-RPC codes, `ConfigError`
//! - **entities**: `AppMetadata`, `RequestArguments`, hex quantity helpers
//! - **signer**: the `Signer` contract exposed to the provider facade
//! - **storage**: `ScopedStorage` over a pluggable `KeyValueStore`
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-crate types are defined here only.
//! - **Namespaced persistence**: a component only writes under its own
//!   `-{scope}:{module}:` prefix.

pub mod entities;
pub mod errors;
pub mod signer;
pub mod storage;

pub use entities::*;
pub use errors::*;
pub use signer::{Address, Signer};
pub use storage::{InMemoryStore, KeyValueStore, ScopedStorage};

//! # Signer Contract
//!
//! The interface the provider facade consumes to decide which signer stays
//! alive. Both the popup (SCW) signer and the relay (WalletLink) signer
//! implement it.

use crate::entities::RequestArguments;
use crate::errors::ProviderResult;
use async_trait::async_trait;
use serde_json::Value;

/// Account address as a `0x`-prefixed hex string.
pub type Address = String;

/// Uniform request/response interface over a remote signer.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Authenticate with the remote signer and return the active accounts.
    async fn handshake(&self) -> ProviderResult<Vec<Address>>;

    /// Forward a request and return its unwrapped result.
    async fn request(&self, args: RequestArguments) -> ProviderResult<Value>;

    /// Tear down the channel and forget persisted session material.
    async fn disconnect(&self) -> ProviderResult<()>;
}

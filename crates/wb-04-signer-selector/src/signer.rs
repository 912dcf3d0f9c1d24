//! The closed set of concrete signers.

use crate::signer_type::SignerType;
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{Address, ProviderResult, RequestArguments, Signer as SignerContract};
use wb_02_scw_signer::ScwSigner;
use wb_03_relay_signer::WalletLinkSigner;

/// A concrete signer. Dispatch is a plain match over the variants.
pub enum Signer {
    Scw(ScwSigner),
    WalletLink(WalletLinkSigner),
}

impl Signer {
    pub fn signer_type(&self) -> SignerType {
        match self {
            Signer::Scw(_) => SignerType::Scw,
            Signer::WalletLink(_) => SignerType::WalletLink,
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signer").field(&self.signer_type()).finish()
    }
}

#[async_trait]
impl SignerContract for Signer {
    async fn handshake(&self) -> ProviderResult<Vec<Address>> {
        match self {
            Signer::Scw(signer) => signer.handshake().await,
            Signer::WalletLink(signer) => signer.handshake().await,
        }
    }

    async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        match self {
            Signer::Scw(signer) => signer.request(args).await,
            Signer::WalletLink(signer) => signer.request(args).await,
        }
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        match self {
            Signer::Scw(signer) => signer.disconnect().await,
            Signer::WalletLink(signer) => signer.disconnect().await,
        }
    }
}

//! Signer protocol identifiers and the preference sent to the popup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signing protocol chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerType {
    /// Smart wallet through the popup
    #[serde(rename = "scw")]
    Scw,
    /// Mobile wallet app through the relay
    #[serde(rename = "walletlink")]
    WalletLink,
}

impl SignerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerType::Scw => "scw",
            SignerType::WalletLink => "walletlink",
        }
    }
}

impl fmt::Display for SignerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scw" => Ok(SignerType::Scw),
            "walletlink" => Ok(SignerType::WalletLink),
            other => Err(format!("unknown signer type: {}", other)),
        }
    }
}

/// Which wallets the dApp accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletOptions {
    #[default]
    All,
    SmartWalletOnly,
    EoaOnly,
}

/// dApp preference forwarded with `selectSignerType`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preference {
    pub options: WalletOptions,
    /// Overrides the popup URL the wallet uses for its own keys page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_url: Option<String>,
}

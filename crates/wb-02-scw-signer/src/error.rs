//! SCW signer errors.

use shared_crypto::CryptoError;
use shared_types::ProviderError;
use thiserror::Error;
use wb_01_popup_transport::TransportError;

/// Failures of the popup-relayed signing protocol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScwError {
    /// The popup channel failed or was closed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Key handling or envelope encryption failed
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// The wallet answered with an error; kept verbatim
    #[error("remote error: {0}")]
    Remote(ProviderError),

    /// The wallet's reply did not have the expected shape
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl From<ScwError> for ProviderError {
    fn from(e: ScwError) -> Self {
        match e {
            ScwError::Remote(err) => err,
            ScwError::Transport(err) => err.into(),
            other => ProviderError::internal(other.to_string()),
        }
    }
}

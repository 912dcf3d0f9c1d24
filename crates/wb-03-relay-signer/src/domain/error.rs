//! Relay errors.

use shared_crypto::CryptoError;
use shared_types::{ConfigError, ProviderError};
use thiserror::Error;

/// Failures of the relay connection and session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    #[error("invalid relay config: {0}")]
    Config(#[from] ConfigError),

    #[error("websocket error: {0}")]
    Socket(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("request {0} timed out")]
    Timeout(u64),

    /// The server answered `Fail`
    #[error("{0}")]
    Server(String),

    #[error("relay connection was destroyed")]
    Destroyed,

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("malformed relay payload: {0}")]
    Protocol(String),

    /// The wallet answered a web3 request with an error
    #[error("remote error: {0}")]
    Remote(ProviderError),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Protocol(e.to_string())
    }
}

impl From<RelayError> for ProviderError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Remote(err) => err,
            other => ProviderError::internal(other.to_string()),
        }
    }
}

//! Filter polyfill errors.

use shared_types::ProviderError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// The node answered with a JSON-RPC error
    #[error("{}", .0.message)]
    Rpc(ProviderError),

    /// The node could not be reached
    #[error("rpc transport failed: {0}")]
    Transport(String),

    /// Malformed filter or block parameter
    #[error("{0}")]
    InvalidParams(String),

    /// The node answered with something of the wrong shape
    #[error("unexpected response received: {0}")]
    UnexpectedResponse(String),
}

impl From<FilterError> for ProviderError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::Rpc(err) => err,
            FilterError::InvalidParams(message) => ProviderError::invalid_params(message),
            other => ProviderError::internal(other.to_string()),
        }
    }
}

//! Transport error types.

use shared_types::ProviderError;
use thiserror::Error;

/// Failures of the popup channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No popup window is open
    #[error("No remote window context")]
    NoRemoteContext,

    /// The popup URL has no concrete origin to post to
    #[error("No target origin")]
    NoTargetOrigin,

    /// The popup closed or disconnected before answering
    #[error("Request rejected")]
    UserRejected,

    /// A listener was dropped by a disconnect
    #[error("Message listener cancelled")]
    ListenerCancelled,

    /// The window opener failed
    #[error("Failed to open popup: {0}")]
    WindowOpenFailed(String),

    /// The window refused a posted message
    #[error("Failed to post message: {0}")]
    PostFailed(String),

    /// Encoding a message failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Popup URL could not be parsed
    #[error("Invalid popup URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e.to_string())
    }
}

impl From<TransportError> for ProviderError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::UserRejected => ProviderError::user_rejected_request(e.to_string()),
            other => ProviderError::internal(other.to_string()),
        }
    }
}

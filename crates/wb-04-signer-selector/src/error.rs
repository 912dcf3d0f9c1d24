//! Signer selection errors.

use shared_types::ProviderError;
use thiserror::Error;
use wb_01_popup_transport::TransportError;
use wb_03_relay_signer::RelayError;

/// Failures while negotiating or building a signer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    /// Talking to the popup failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The relay signer could not be built
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The popup answered `selectSignerType` with something unusable
    #[error("invalid signer type reply: {0}")]
    InvalidReply(String),
}

impl From<SelectorError> for ProviderError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::Transport(err) => err.into(),
            SelectorError::Relay(err) => err.into(),
            other => ProviderError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::codes;

    #[test]
    fn test_popup_closed_is_user_rejection() {
        let err: ProviderError = SelectorError::Transport(TransportError::UserRejected).into();
        assert_eq!(err.code, codes::USER_REJECTED_REQUEST);
    }

    #[test]
    fn test_bad_reply_is_internal() {
        let err: ProviderError = SelectorError::InvalidReply("null".into()).into();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
        assert!(err.message.contains("null"));
    }
}

//! Popup transport configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use url::Url;

/// Default keys.coinbase.com popup URL
pub const DEFAULT_POPUP_URL: &str = "https://keys.coinbase.com/connect";

/// Configuration for a [`crate::PopupTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    /// URL opened in the popup; its origin is the only accepted sender
    pub url: String,
    /// SDK version sent in the handshake reply
    pub version: String,
    /// Expected number of concurrent requests (sizing hint)
    pub pending_capacity: usize,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_POPUP_URL.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pending_capacity: 16,
        }
    }
}

impl PopupConfig {
    /// Config for a popup at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parsed popup URL.
    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            field: "url",
            reason: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_url()?;
        if self.version.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "version",
                reason: "cannot be empty".into(),
            });
        }
        if self.pending_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pending_capacity",
                reason: "cannot be 0".into(),
            });
        }
        Ok(())
    }
}

//! Relay connection configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use std::time::Duration;
use url::Url;

/// Public WalletLink relay.
pub const DEFAULT_LINK_API_URL: &str = "https://www.walletlink.org";

/// Relay tuning. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay base URL; the socket lives at `{url}/rpc` with `ws(s)` scheme
    pub link_api_url: String,
    /// Interval between heartbeat frames
    pub heartbeat_interval_ms: u64,
    /// Timeout for any request awaiting a server reply
    pub request_timeout_ms: u64,
    /// Delay between reconnect attempts
    pub reconnect_delay_ms: u64,
    /// Timeout for the destroy notice sent on reset
    pub destroy_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            link_api_url: DEFAULT_LINK_API_URL.to_string(),
            heartbeat_interval_ms: 10_000,
            request_timeout_ms: 60_000,
            reconnect_delay_ms: 5_000,
            destroy_timeout_ms: 1_000,
        }
    }
}

impl RelayConfig {
    /// Config for a relay at `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            link_api_url: url.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence longer than this tears the socket down.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval() * 2
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_millis(self.destroy_timeout_ms)
    }

    /// Parsed HTTP base URL.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.link_api_url).map_err(|e| ConfigError::InvalidUrl {
            field: "link_api_url",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidUrl {
                field: "link_api_url",
                reason: format!("unsupported scheme {}", other),
            }),
        }
    }

    /// Socket URL: `http(s)` becomes `ws(s)` and `/rpc` is appended.
    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        let api = self.api_url()?;
        let base = api.as_str().trim_end_matches('/');
        let ws = format!("ws{}/rpc", base.trim_start_matches("http"));
        Url::parse(&ws).map_err(|e| ConfigError::InvalidUrl {
            field: "link_api_url",
            reason: e.to_string(),
        })
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;
        for (field, value) in [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("destroy_timeout_ms", self.destroy_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidDuration {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(20));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_websocket_url() {
        let config = RelayConfig::new("https://relay.example.org");
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://relay.example.org/rpc"
        );
        let config = RelayConfig::new("http://127.0.0.1:8080/");
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://127.0.0.1:8080/rpc"
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RelayConfig::new("ftp://relay").validate().is_err());
        assert!(RelayConfig::new("not a url").validate().is_err());
        let config = RelayConfig {
            reconnect_delay_ms: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration { field: "reconnect_delay_ms", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"link_api_url": "https://relay.example.org"}"#).unwrap();
        assert_eq!(config.heartbeat_interval_ms, 10_000);
        assert_eq!(config.link_api_url, "https://relay.example.org");
    }
}

//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for a bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,

    /// Component identifier (01-05, 00 for the whole bridge)
    pub component_id: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "wallet-bridge".to_string(),
            component_id: "00".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WB_SERVICE_NAME`: Service name (default: wallet-bridge)
    /// - `WB_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `WB_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `WB_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("WB_SERVICE_NAME")
                .unwrap_or_else(|_| "wallet-bridge".to_string()),

            component_id: "00".to_string(),

            log_level: env::var("WB_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("WB_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("WB_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Create configuration for a specific component.
    pub fn for_component(component_id: &str, component_name: &str) -> Self {
        let mut config = Self::from_env();
        config.component_id = component_id.to_string();
        config.service_name = format!("wb-{}-{}", component_id, component_name);
        config
    }

    /// Get the full service name including component.
    pub fn full_service_name(&self) -> String {
        if self.component_id == "00" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.component_id)
        }
    }
}

//! # Wallet Bridge Telemetry
//!
//! Structured logging for the bridge crates, built on `tracing` and
//! `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wb_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_component("03", "relay-signer");
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WB_SERVICE_NAME` | `wallet-bridge` | Service name |
//! | `WB_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `WB_CONSOLE_OUTPUT` | `true` | Write events to stdout |
//! | `WB_JSON_LOGS` | `false` | JSON instead of pretty output |

#![warn(clippy::all)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

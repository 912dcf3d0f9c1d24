//! Domain layer: message envelope, correlation store, errors, config.

pub mod config;
pub mod error;
pub mod message;
pub mod pending;

pub use config::{PopupConfig, DEFAULT_POPUP_URL};
pub use error::TransportError;
pub use message::{ConfigEvent, Message, MessageId};
pub use pending::{PendingRequestStore, PendingResult, PendingStats};

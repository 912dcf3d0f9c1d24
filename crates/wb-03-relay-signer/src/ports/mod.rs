//! Outbound ports of the relay signer.

pub mod events_api;
pub mod socket;

pub use events_api::{UnseenEvent, UnseenEventsApi};
pub use socket::{RelaySocketConnector, SocketHandle};

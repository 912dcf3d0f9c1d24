//! Relay socket port.

use crate::domain::RelayError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// An open text-frame socket.
///
/// Dropping `outbound` closes the socket; `inbound` yields `None` once the
/// remote side has closed it.
#[derive(Debug)]
pub struct SocketHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens sockets to the relay server.
#[async_trait]
pub trait RelaySocketConnector: Send + Sync {
    /// Open a socket to `url`, resolving once it is ready for frames.
    async fn connect(&self, url: &Url) -> Result<SocketHandle, RelayError>;
}

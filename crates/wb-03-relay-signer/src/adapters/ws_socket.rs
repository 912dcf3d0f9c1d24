//! tokio-tungstenite socket adapter.

use crate::domain::RelayError;
use crate::ports::{RelaySocketConnector, SocketHandle};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// Connects to the relay with a real websocket.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RelaySocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHandle, RelayError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::Socket(e.to_string()))?;
        debug!(url = %url, "Relay websocket open");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        let Some(text) = frame else {
                            // Owner dropped the handle.
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Relay websocket send failed");
                            break;
                        }
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(text.to_string()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            warn!(error = %e, "Relay websocket read failed");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
            debug!("Relay websocket closed");
        });

        Ok(SocketHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

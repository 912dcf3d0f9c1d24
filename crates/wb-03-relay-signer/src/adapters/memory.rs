//! In-process relay server, for tests and local embedding.

use crate::domain::{ClientMessage, RelayError, RelaySession, ServerMessage, HEARTBEAT_FRAME};
use crate::ports::{RelaySocketConnector, SocketHandle, UnseenEvent, UnseenEventsApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use url::Url;

/// Server end of one in-memory socket.
#[derive(Debug)]
pub struct ServerSocket {
    url: Url,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSocket {
    /// URL the client dialed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Next raw frame, heartbeats included. `None` once the client closed.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next typed frame, skipping heartbeats and unparseable text.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            let frame = self.from_client.recv().await?;
            if frame == HEARTBEAT_FRAME {
                continue;
            }
            if let Ok(message) = serde_json::from_str(&frame) {
                return Some(message);
            }
        }
    }

    pub fn send(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send_frame(&text),
            Err(_) => false,
        }
    }

    pub fn send_frame(&self, text: &str) -> bool {
        self.to_client
            .as_ref()
            .map(|tx| tx.send(text.to_string()).is_ok())
            .unwrap_or(false)
    }

    /// Close from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Accept `HostSession`, then answer `IsLinked` and `GetSessionConfig`.
    ///
    /// Returns the authenticated session id.
    pub async fn accept_session(
        &mut self,
        linked: bool,
        metadata: BTreeMap<String, String>,
    ) -> Option<String> {
        let (id, session_id) = match self.recv().await? {
            ClientMessage::HostSession { id, session_id, .. } => (id, session_id),
            _ => return None,
        };
        self.send(&ServerMessage::Ok {
            id,
            session_id: session_id.clone(),
        });

        let mut answered = (false, false);
        while answered != (true, true) {
            match self.recv().await? {
                ClientMessage::IsLinked { id, session_id } => {
                    self.send(&ServerMessage::IsLinkedOk {
                        id,
                        session_id,
                        linked,
                        online_guests: 0,
                    });
                    answered.0 = true;
                }
                ClientMessage::GetSessionConfig { id, session_id } => {
                    self.send(&ServerMessage::GetSessionConfigOk {
                        id,
                        session_id,
                        webhook_id: None,
                        webhook_url: None,
                        metadata: metadata.clone(),
                    });
                    answered.1 = true;
                }
                _ => return None,
            }
        }
        Some(session_id)
    }
}

/// Connector whose sockets are handed to a [`ServerSocket`] receiver.
#[derive(Debug)]
pub struct MemorySocketConnector {
    accept: mpsc::UnboundedSender<ServerSocket>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemorySocketConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSocket>) {
        let (accept, sockets) = mpsc::unbounded_channel();
        (
            Self {
                accept,
                refusing: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            },
            sockets,
        )
    }

    /// Fail every connection attempt while set.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelaySocketConnector for MemorySocketConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHandle, RelayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(RelayError::Socket("connection refused".into()));
        }
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let server = ServerSocket {
            url: url.clone(),
            to_client: Some(to_client),
            from_client,
        };
        self.accept
            .send(server)
            .map_err(|_| RelayError::Socket("no relay server listening".into()))?;
        Ok(SocketHandle { outbound, inbound })
    }
}

/// Event store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryEventsApi {
    unseen: Mutex<Vec<UnseenEvent>>,
    seen: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl MemoryEventsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event as if the wallet published it while we were offline.
    pub fn push(&self, event: UnseenEvent) {
        self.unseen.lock().push(event);
    }

    /// Ids marked seen, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnseenEventsApi for MemoryEventsApi {
    async fn fetch_unseen_events(
        &self,
        _session: &RelaySession,
    ) -> Result<Vec<UnseenEvent>, RelayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.unseen.lock().clone())
    }

    async fn mark_seen(&self, _session: &RelaySession, event_id: &str) -> Result<(), RelayError> {
        self.unseen.lock().retain(|e| e.id != event_id);
        self.seen.lock().push(event_id.to_string());
        Ok(())
    }
}

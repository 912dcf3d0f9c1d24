//! Missed-event HTTP port.

use crate::domain::{RelayError, RelaySession};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An event stored by the relay while this side was offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnseenEvent {
    pub id: String,
    pub event: String,
    /// Encrypted payload
    pub data: String,
}

/// Access to the relay's event store, authenticated as `session`.
#[async_trait]
pub trait UnseenEventsApi: Send + Sync {
    /// Events not yet marked seen for this session.
    async fn fetch_unseen_events(&self, session: &RelaySession)
        -> Result<Vec<UnseenEvent>, RelayError>;

    /// Mark one event seen so it is not delivered again.
    async fn mark_seen(&self, session: &RelaySession, event_id: &str) -> Result<(), RelayError>;
}

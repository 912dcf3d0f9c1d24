//! Pending request store for outbound popup messages.
//!
//! Maps the id of each posted message to the waiter expecting its reply.
//! Completion is first-come: a second reply with the same `requestId`
//! finds no entry and is dropped.

use crate::domain::error::TransportError;
use crate::domain::message::{Message, MessageId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outcome delivered to a waiter.
pub type PendingResult = Result<Message, TransportError>;

struct PendingRequest {
    sender: oneshot::Sender<PendingResult>,
    created_at: Instant,
}

/// Statistics for the pending store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests answered by the popup
    pub total_completed: AtomicU64,
    /// Total requests rejected on disconnect
    pub total_rejected: AtomicU64,
    /// Total requests whose waiter went away first
    pub total_cancelled: AtomicU64,
}

/// Outstanding requests keyed by message id.
#[derive(Default)]
pub struct PendingRequestStore {
    pending: DashMap<MessageId, PendingRequest>,
    stats: PendingStats,
}

impl PendingRequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for replies to `id`.
    pub fn register(&self, id: MessageId) -> oneshot::Receiver<PendingResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                sender: tx,
                created_at: Instant::now(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(message_id = %id, "Registered pending request");
        rx
    }

    /// Deliver `reply` to the waiter for `id`.
    ///
    /// Returns false if nothing was waiting.
    pub fn complete(&self, id: MessageId, reply: Message) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            debug!(message_id = %id, "Reply for unknown message id");
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        if pending.sender.send(Ok(reply)).is_ok() {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                message_id = %id,
                response_time_ms = elapsed.as_millis(),
                "Completed pending request"
            );
            true
        } else {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Fail every outstanding waiter with a clone of `error`.
    ///
    /// Returns the number of waiters rejected.
    pub fn reject_all(&self, error: &TransportError) -> usize {
        let ids: Vec<MessageId> = self.pending.iter().map(|e| *e.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.sender.send(Err(error.clone()));
                rejected += 1;
            }
        }
        if rejected > 0 {
            self.stats
                .total_rejected
                .fetch_add(rejected as u64, Ordering::Relaxed);
            warn!(count = rejected, error = %error, "Rejected pending requests");
        }
        rejected
    }

    /// Drop the waiter for `id` without answering it.
    pub fn cancel(&self, id: MessageId) -> bool {
        if self.pending.remove(&id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if `id` is still waiting
    pub fn is_pending(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::ConfigEvent;
    use proptest::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_complete() {
        let store = PendingRequestStore::new();
        let id = MessageId::new();
        let rx = store.register(id);
        assert!(store.is_pending(id));

        let reply = Message::reply(id, json!("ok"));
        assert!(store.complete(id, reply.clone()));
        assert_eq!(rx.await.unwrap().unwrap(), reply);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_reply_dropped() {
        let store = PendingRequestStore::new();
        let id = MessageId::new();
        let _rx = store.register(id);

        assert!(store.complete(id, Message::reply(id, json!(1))));
        assert!(!store.complete(id, Message::reply(id, json!(2))));
    }

    #[tokio::test]
    async fn test_reject_all() {
        let store = PendingRequestStore::new();
        let a = store.register(MessageId::new());
        let b = store.register(MessageId::new());

        assert_eq!(store.reject_all(&TransportError::UserRejected), 2);
        assert_eq!(a.await.unwrap(), Err(TransportError::UserRejected));
        assert_eq!(b.await.unwrap(), Err(TransportError::UserRejected));
        assert_eq!(store.stats().total_rejected.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_complete_after_receiver_dropped() {
        let store = PendingRequestStore::new();
        let id = MessageId::new();
        drop(store.register(id));

        assert!(!store.complete(id, Message::config(ConfigEvent::PopupLoaded, None)));
        assert_eq!(store.stats().total_cancelled.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_cancel() {
        let store = PendingRequestStore::new();
        let id = MessageId::new();
        let _rx = store.register(id);
        assert!(store.cancel(id));
        assert!(!store.cancel(id));
    }

    proptest! {
        #[test]
        fn prop_replies_reach_their_own_waiter(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
            let store = PendingRequestStore::new();
            let ids: Vec<MessageId> = (0..8).map(|_| MessageId::new()).collect();
            let mut waiters: Vec<_> = ids.iter().map(|id| store.register(*id)).collect();

            for i in order {
                prop_assert!(store.complete(ids[i], Message::reply(ids[i], json!(i))));
            }
            for (i, waiter) in waiters.iter_mut().enumerate() {
                let reply = waiter.try_recv().unwrap().unwrap();
                prop_assert_eq!(reply.request_id, Some(ids[i]));
                prop_assert_eq!(reply.data, Some(json!(i)));
            }
            prop_assert_eq!(store.pending_count(), 0);
        }
    }
}

//! Correlation of asynchronous cloud replies with waiting transactions.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Reply delivered by the cloud notification path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudReply {
    /// HTTP status the device reported.
    pub status: u16,
    /// Response headers the device reported.
    pub headers: Vec<(String, String)>,
    /// JSON body text.
    pub body: String,
}

/// Pending cloud replies keyed by correlation id.
///
/// Clones share the same map. A slot is registered before the request is
/// sent and resolved by whatever receives the device's notification.
#[derive(Clone, Debug, Default)]
pub struct PendingReplies {
    slots: Arc<DashMap<String, oneshot::Sender<CloudReply>>>,
}

impl PendingReplies {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Reserve a slot for `correlation_id`, replacing any previous one.
    pub(crate) fn register(&self, correlation_id: &str) -> oneshot::Receiver<CloudReply> {
        let (tx, rx) = oneshot::channel();
        if self.slots.insert(correlation_id.to_owned(), tx).is_some() {
            warn!(correlation_id, "pending reply slot replaced");
        }
        rx
    }

    /// Hand `reply` to the transaction waiting on `correlation_id`.
    ///
    /// Returns `false` when nothing is waiting under that id.
    pub fn resolve(&self, correlation_id: &str, reply: CloudReply) -> bool {
        let Some((_, tx)) = self.slots.remove(correlation_id) else {
            debug!(correlation_id, "no pending transaction for cloud reply");
            return false;
        };
        tx.send(reply).is_ok()
    }

    /// Drop the slot for `correlation_id`, if still present.
    pub fn remove(&self, correlation_id: &str) -> bool {
        self.slots.remove(correlation_id).is_some()
    }

    /// Drop every slot; waiting transactions fail with a communication error.
    pub fn clear(&self) {
        let dropped = self.slots.len();
        self.slots.clear();
        if dropped > 0 {
            debug!(dropped, "pending cloud replies cleared");
        }
    }

    /// Number of waiting transactions.
    #[must_use]
    pub fn len(&self) -> usize { self.slots.len() }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
}

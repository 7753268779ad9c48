//! Single-fire terminal signal for a transaction.
//!
//! The exchange task, [`AbortHandle::abort`] and the timeout all race to
//! settle a transaction. The first caller wins; later calls get their value
//! back and leave the outcome untouched.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::outcome::{Settled, TransactionState};

pub(crate) struct Completion {
    tx: Mutex<Option<oneshot::Sender<Settled>>>,
    state: watch::Sender<TransactionState>,
}

impl Completion {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<Settled>) {
        let (tx, rx) = oneshot::channel();
        let (state, _) = watch::channel(TransactionState::Idle);
        let completion = Self {
            tx: Mutex::new(Some(tx)),
            state,
        };
        (Arc::new(completion), rx)
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<Settled>>> {
        match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver `settled` unless the transaction already settled.
    pub(crate) fn settle(&self, settled: Settled) -> Result<(), Settled> {
        let mut guard = self.lock();
        let Some(tx) = guard.take() else {
            return Err(settled);
        };
        self.state.send_replace(settled.state);
        if tx.send(settled).is_err() {
            debug!("transaction settled after its caller went away");
        }
        Ok(())
    }

    pub(crate) fn is_settled(&self) -> bool { self.lock().is_none() }

    /// Record a non-terminal state while the exchange runs.
    pub(crate) fn advance(&self, next: TransactionState) {
        let guard = self.lock();
        if guard.is_some() {
            self.state.send_replace(next);
        }
    }

    pub(crate) fn state(&self) -> TransactionState { *self.state.borrow() }
}

/// Cancels a transaction from any task.
///
/// Aborting is safe at any time: before the request is issued, while it is in
/// flight, or after it has completed, in which case it does nothing.
#[derive(Clone)]
pub struct AbortHandle {
    completion: Arc<Completion>,
    cancel: CancellationToken,
}

impl AbortHandle {
    pub(crate) const fn new(completion: Arc<Completion>, cancel: CancellationToken) -> Self {
        Self { completion, cancel }
    }

    /// Stop the transaction, classifying it as a timeout or an abort.
    ///
    /// Returns `true` when this call settled the transaction.
    pub fn abort(&self, is_timeout: bool) -> bool {
        let settled = self.completion.settle(Settled::aborted(is_timeout)).is_ok();
        self.cancel.cancel();
        if settled {
            debug!(is_timeout, "transaction aborted");
        }
        settled
    }

    /// Whether the transaction has settled by any path.
    #[must_use]
    pub fn is_settled(&self) -> bool { self.completion.is_settled() }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("state", &self.completion.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

//! Matching APS data confirms to the requests that caused them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use deconz_protocol::{Open, TxStatus};
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u8,
    /// `None` once the confirm for that id has been delivered.
    pending: HashMap<u8, Option<oneshot::Sender<Open<TxStatus>>>>,
}

/// Tracks outstanding APS data requests by request id.
///
/// Register an id before sending the request; the receiver resolves when the
/// firmware's data confirm for that id is drained.
#[derive(Debug, Clone, Default)]
pub struct TxConfirmTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl TxConfirmTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next request id (wrapping).
    pub fn next_request_id(&self) -> u8 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        id
    }

    /// Wait for the confirm of `request_id`. Re-registering an id replaces
    /// the previous waiter.
    pub fn register(&self, request_id: u8) -> oneshot::Receiver<Open<TxStatus>> {
        let (tx, rx) = oneshot::channel();
        self.lock().pending.insert(request_id, Some(tx));
        rx
    }

    /// Forget `request_id`, e.g. after its confirm was consumed or the caller
    /// gave up.
    pub fn unregister(&self, request_id: u8) {
        self.lock().pending.remove(&request_id);
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether no ids are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a drained confirm.
    pub fn handle_tx_confirm(&self, request_id: u8, status: Open<TxStatus>) {
        let mut state = self.lock();
        match state.pending.get_mut(&request_id) {
            None => {
                warn!(request_id, %status, "Unexpected transmit confirm for request id");
            }
            Some(slot) => {
                let delivered = slot.take().is_some_and(|tx| tx.send(status).is_ok());
                if !delivered {
                    debug!(request_id, %status, "Transmit confirm already delivered, probably duplicate response");
                }
            }
        }
    }
}

//! Request/response correlation with timeout sweeping.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use tether_core::CorrelationIds;

use crate::errors::ClientError;

/// Result delivered to a pending call's future.
pub type CallResult = Result<Value, ClientError>;

struct PendingCall {
    tx: oneshot::Sender<CallResult>,
    timeout: Option<Duration>,
    issued_at: Instant,
}

/// Pending-call table: mints correlation ids, matches responses, and
/// expires calls whose timeout has elapsed.
///
/// Each call is a `oneshot` pair, so a call resolves exactly once — a
/// late response after a timeout finds no entry and is dropped.
pub struct RpcCorrelator {
    ids: CorrelationIds,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl RpcCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self {
            ids: CorrelationIds::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mint an id and record a pending call. The returned receiver
    /// resolves on response, timeout, or connection loss.
    pub fn register(&self, timeout: Option<Duration>) -> (String, oneshot::Receiver<CallResult>) {
        let id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(
            id.clone(),
            PendingCall {
                tx,
                timeout,
                issued_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Resolve a pending call with a response payload.
    ///
    /// Returns `false` when the id is unknown — a late or duplicate
    /// response, which is not an error.
    pub fn resolve(&self, id: &str, payload: Value) -> bool {
        match self.pending.lock().remove(id) {
            Some(call) => {
                let _ = call.tx.send(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Remove a pending call without resolving it (send-side failure
    /// after registration).
    pub fn abandon(&self, id: &str) {
        let _ = self.pending.lock().remove(id);
    }

    /// Expire every call whose timeout has elapsed. Returns how many
    /// calls were expired. Calls without a timeout never expire.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, call)| {
                call.timeout
                    .is_some_and(|t| now.duration_since(call.issued_at) > t)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(call) = pending.remove(id) {
                debug!(id, "pending call timed out");
                let _ = call.tx.send(Err(ClientError::CallTimeout));
            }
        }
        expired.len()
    }

    /// Fail every pending call with [`ClientError::ConnectionLost`] and
    /// clear the table. Invoked on connection loss so no call outlives
    /// the connection that issued it.
    pub fn flush(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        for (_, call) in pending.drain() {
            let _ = call.tx.send(Err(ClientError::ConnectionLost));
        }
        count
    }

    /// Number of calls currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }

    /// Total correlation ids minted.
    pub fn minted(&self) -> u64 {
        self.ids.minted()
    }
}

impl Default for RpcCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

//! Correlation-id minting.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Mints correlation ids pairing outbound requests with responses.
///
/// Ids are `{prefix}-{n}`: the prefix is a per-client UUID so ids from a
/// restarted client never collide with stale responses, and `n` is a
/// monotonic counter so ids never repeat within a client's lifetime.
#[derive(Debug)]
pub struct CorrelationIds {
    prefix: String,
    counter: AtomicU64,
}

impl CorrelationIds {
    /// Create a minter with a fresh UUID prefix.
    pub fn new() -> Self {
        Self {
            prefix: Uuid::now_v7().simple().to_string(),
            counter: AtomicU64::new(0),
        }
    }

    /// Mint the next id.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }

    /// Total ids minted so far.
    pub fn minted(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

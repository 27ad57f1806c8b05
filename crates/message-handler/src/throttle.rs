// SPDX-License-Identifier: Apache-2.0

//! Per-namespace rate gate (§4.2 step 1): a counter per
//! `(broker_id, first-two-topic-segments)` key, cleared in one shot by a
//! periodic background worker rather than tracked per-key with timestamps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::warn;

const RESET_INTERVAL: Duration = Duration::from_millis(1000);

pub struct NamespaceThrottle {
    counters: DashMap<String, AtomicU64>,
    limit: u64,
}

impl NamespaceThrottle {
    pub fn new(limit: u32) -> Arc<Self> {
        Arc::new(Self {
            counters: DashMap::new(),
            limit: limit as u64,
        })
    }

    /// Increment `key`'s counter and report whether this message is within
    /// the per-window limit. Logs once, on the increment that first crosses
    /// the limit.
    pub fn gate(&self, key: &str) -> bool {
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;

        if count <= self.limit {
            return true;
        }
        if count == self.limit + 1 {
            warn!(namespace = %key, limit = self.limit, "namespace rate limit exceeded, dropping");
        }
        false
    }

    /// Clear every counter. Run every [`RESET_INTERVAL`] by
    /// [`spawn_reset_loop`](Self::spawn_reset_loop).
    pub fn reset(&self) {
        self.counters.clear();
    }

    /// Start the periodic reset worker. The returned handle is owned by the
    /// caller (`uns-hub`), which aborts it on shutdown.
    pub fn spawn_reset_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESET_INTERVAL);
            loop {
                interval.tick().await;
                this.reset();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_messages_under_the_limit() {
        let throttle = NamespaceThrottle::new(3);
        assert!(throttle.gate("b1:a/b"));
        assert!(throttle.gate("b1:a/b"));
        assert!(throttle.gate("b1:a/b"));
    }

    #[test]
    fn drops_messages_over_the_limit() {
        let throttle = NamespaceThrottle::new(2);
        assert!(throttle.gate("b1:a/b"));
        assert!(throttle.gate("b1:a/b"));
        assert!(!throttle.gate("b1:a/b"));
        assert!(!throttle.gate("b1:a/b"));
    }

    #[test]
    fn namespaces_are_independent() {
        let throttle = NamespaceThrottle::new(1);
        assert!(throttle.gate("b1:a/b"));
        assert!(throttle.gate("b1:c/d"));
    }

    #[test]
    fn reset_clears_all_counters() {
        let throttle = NamespaceThrottle::new(1);
        assert!(throttle.gate("b1:a/b"));
        assert!(!throttle.gate("b1:a/b"));
        throttle.reset();
        assert!(throttle.gate("b1:a/b"));
    }
}

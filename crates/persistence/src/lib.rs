// SPDX-License-Identifier: Apache-2.0

//! Component C, the Persistence Queue (§4.3): batches events into the
//! store under a transaction and, only after a batch commits, replays
//! store-dependent events to the transformation engine so transforms that
//! query the store observe their own just-written data (read-your-writes,
//! §8.4).

mod errors;
mod queue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uns_model::Event;

pub use errors::PersistenceError;
pub use queue::QueueStats;
use queue::BoundedQueue;

pub const DEFAULT_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 2_000;

/// Invoked once per event in a committed batch whose
/// `needs_store_for_transform` is set. Implemented as a callback rather
/// than a reference back to the transform engine, keeping the pipeline
/// B -> C -> F unidirectional (§9 "Cross-component references").
pub trait TransformReplay: Send + Sync {
    fn replay(&self, event: Event);
}

impl<F: Fn(Event) + Send + Sync> TransformReplay for F {
    fn replay(&self, event: Event) {
        self(event)
    }
}

pub struct PersistenceConfig {
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    pub soft_bound: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            soft_bound: queue::DEFAULT_SOFT_BOUND,
        }
    }
}

pub struct PersistenceQueue {
    queue: Arc<BoundedQueue>,
    store: store::Store,
    replay: Arc<dyn TransformReplay>,
    interval: Duration,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
}

impl PersistenceQueue {
    pub fn new(store: store::Store, replay: Arc<dyn TransformReplay>, config: PersistenceConfig) -> Arc<Self> {
        Arc::new(Self {
            queue: Arc::new(BoundedQueue::new(config.soft_bound, config.batch_size)),
            store,
            replay,
            interval: Duration::from_millis(config.batch_interval_ms),
            worker: AsyncMutex::new(None),
        })
    }

    /// Non-blocking enqueue (§4.3's public contract). Safe to call from the
    /// message handler's cooperative path.
    pub fn insert(&self, event: Event) {
        self.queue.push(event);
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Start the background batch-commit loop.
    pub async fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                this.queue.wait_for_work(this.interval).await;
                if let Err(e) = this.drain_and_commit().await {
                    warn!(error = %e, "batch commit failed, events left queued for retry");
                }
            }
        });
        *self.worker.lock().await = Some(handle);
    }

    /// Cancel the timer, drain once more synchronously, then stop (§4.3
    /// "Draining on shutdown").
    pub async fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }
        while !self.queue.is_empty() {
            if let Err(e) = self.drain_and_commit().await {
                error!(error = %e, "final drain on shutdown failed, events may be lost");
                break;
            }
        }
    }

    async fn drain_and_commit(&self) -> Result<(), PersistenceError> {
        let batch = self.queue.drain_batch();
        if batch.is_empty() {
            return Ok(());
        }

        let replay_candidates: Vec<Event> = batch
            .iter()
            .filter(|e| e.needs_store_for_transform)
            .cloned()
            .collect();
        let batch_len = batch.len();

        self.store.insert_batch(batch).await?;
        self.queue.record_processed(batch_len);
        info!(count = batch_len, "committed batch");

        for event in replay_candidates {
            self.replay.replay(event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event(topic: &str, needs_store: bool) -> Event {
        let mut event = Event::new("b1", topic, Utc::now(), "{}", false);
        event.needs_store_for_transform = needs_store;
        event
    }

    #[tokio::test]
    async fn insert_is_non_blocking_and_commits_on_drain() {
        let store = store::Store::open_in_memory().unwrap();
        let queue = PersistenceQueue::new(
            store.clone(),
            Arc::new(|_: Event| {}),
            PersistenceConfig::default(),
        );
        queue.insert(sample_event("a/b", false));
        queue.drain_and_commit().await.unwrap();

        let rows = store.query_all("SELECT * FROM mqtt_events").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn committed_store_dependent_events_are_replayed() {
        let store = store::Store::open_in_memory().unwrap();
        let replayed = Arc::new(AtomicUsize::new(0));
        let replayed_clone = replayed.clone();
        let queue = PersistenceQueue::new(
            store,
            Arc::new(move |_: Event| {
                replayed_clone.fetch_add(1, Ordering::SeqCst);
            }),
            PersistenceConfig::default(),
        );

        queue.insert(sample_event("s/1", true));
        queue.insert(sample_event("s/2", false));
        queue.drain_and_commit().await.unwrap();

        assert_eq!(replayed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_remaining_events() {
        let store = store::Store::open_in_memory().unwrap();
        let queue = PersistenceQueue::new(
            store.clone(),
            Arc::new(|_: Event| {}),
            PersistenceConfig::default(),
        );
        queue.insert(sample_event("a/b", false));
        queue.shutdown().await;

        let rows = store.query_all("SELECT * FROM mqtt_events").await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}

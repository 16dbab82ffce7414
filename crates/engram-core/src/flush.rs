//! Access-stat flusher
//!
//! Recall must never block on bookkeeping writes. Layers enqueue access
//! updates here; a background task batches them and writes on a short
//! interval or on shutdown. The queue is bounded: overflow drops updates
//! with a warning, which is safe because activation counters are monotonic
//! best-effort signals, not ledgers.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::FlushConfig;
use crate::store::Store;

// ============================================================================
// UPDATES
// ============================================================================

/// One deferred access-stat update
#[derive(Debug, Clone)]
pub enum AccessUpdate {
    /// Event recalled: bump activation_count, refresh last_activation
    Event {
        id: String,
        at: DateTime<Utc>,
    },
    /// Semantic memory retrieved: bump access_count, stamp last_retrieved_at
    Semantic {
        id: String,
        at: DateTime<Utc>,
    },
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable enqueue handle
#[derive(Clone)]
pub struct FlushHandle {
    tx: mpsc::Sender<AccessUpdate>,
}

impl FlushHandle {
    /// Enqueue an update without blocking; a full queue drops it
    pub fn enqueue(&self, update: AccessUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            warn!(error = %e, "access-stat queue full, dropping update");
        }
    }

    /// Convenience: enqueue access updates for a batch of recalled events
    pub fn touch_events<'a>(&self, ids: impl Iterator<Item = &'a str>, at: DateTime<Utc>) {
        for id in ids {
            self.enqueue(AccessUpdate::Event {
                id: id.to_string(),
                at,
            });
        }
    }

    /// Convenience: enqueue retrieval updates for recalled memories
    pub fn touch_memories<'a>(&self, ids: impl Iterator<Item = &'a str>, at: DateTime<Utc>) {
        for id in ids {
            self.enqueue(AccessUpdate::Semantic {
                id: id.to_string(),
                at,
            });
        }
    }
}

// ============================================================================
// FLUSHER
// ============================================================================

/// Background access-stat writer
pub struct AccessFlusher {
    handle: FlushHandle,
    stop: tokio::sync::watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

impl AccessFlusher {
    /// Spawn the flusher task on the current tokio runtime
    pub fn spawn(store: Arc<Store>, config: FlushConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<AccessUpdate>(config.queue_capacity.max(1));
        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let interval = std::time::Duration::from_millis(config.flush_interval_ms.max(10));

        let worker = tokio::spawn(async move {
            let mut pending: Vec<AccessUpdate> = Vec::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(update) => pending.push(update),
                        None => break, // every handle dropped
                    },
                    _ = ticker.tick() => {
                        flush_batch(&store, std::mem::take(&mut pending)).await;
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            // Final drain: layers may still hold handles, so take whatever is
            // already queued rather than waiting for the channel to close
            while let Ok(update) = rx.try_recv() {
                pending.push(update);
            }
            flush_batch(&store, std::mem::take(&mut pending)).await;
            debug!("access-stat flusher drained and stopped");
        });

        Self {
            handle: FlushHandle { tx },
            stop: stop_tx,
            worker,
        }
    }

    /// Enqueue handle for layers
    pub fn handle(&self) -> FlushHandle {
        self.handle.clone()
    }

    /// Drain remaining updates and stop the worker
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "flusher worker join failed");
        }
    }
}

/// Write one batch; failures are logged and never surfaced
async fn flush_batch(store: &Arc<Store>, updates: Vec<AccessUpdate>) {
    if updates.is_empty() {
        return;
    }
    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || {
        // Coalesce per-event deltas so N recalls become one UPDATE
        let mut events: HashMap<String, (DateTime<Utc>, i64)> = HashMap::new();
        let mut memories: Vec<(String, DateTime<Utc>)> = Vec::new();
        for update in updates {
            match update {
                AccessUpdate::Event { id, at } => {
                    let entry = events.entry(id).or_insert((at, 0));
                    entry.0 = entry.0.max(at);
                    entry.1 += 1;
                }
                AccessUpdate::Semantic { id, at } => memories.push((id, at)),
            }
        }

        let event_batch: Vec<(String, DateTime<Utc>, i64)> = events
            .into_iter()
            .map(|(id, (at, delta))| (id, at, delta))
            .collect();
        if let Err(e) = store.event_touch_batch(&event_batch) {
            warn!(error = %e, "event access flush failed");
        }
        for (id, at) in memories {
            if let Err(e) = store.semantic_record_retrieval(&id, at) {
                // Deleted rows are expected here; anything else is just logged
                debug!(id, error = %e, "semantic access flush skipped");
            }
        }
    })
    .await;
    if let Err(e) = result {
        warn!(error = %e, "access flush task panicked");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlushConfig;
    use crate::model::{EventContext, EventInput, EventType, Outcome};
    use crate::store::test_util::test_store;

    fn event_input(content: &str) -> EventInput {
        EventInput {
            session_id: "s1".into(),
            event_type: EventType::Action,
            content: content.into(),
            context: EventContext::default(),
            outcome: Outcome::Success,
            importance: 0.5,
            contextuality: 0.5,
            actionability: 0.5,
        }
    }

    #[tokio::test]
    async fn updates_are_flushed_and_coalesced() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let input = event_input("recalled a lot");
        let hash = input.content_hash();
        let event = store
            .event_insert(&project.id, &input, &hash, None, Utc::now())
            .unwrap();

        let flusher = AccessFlusher::spawn(
            store.clone(),
            FlushConfig {
                queue_capacity: 64,
                flush_interval_ms: 10,
            },
        );
        let handle = flusher.handle();
        let now = Utc::now();
        for _ in 0..5 {
            handle.enqueue(AccessUpdate::Event {
                id: event.id.clone(),
                at: now,
            });
        }
        flusher.shutdown().await;

        let updated = store.event_get(&event.id).unwrap().unwrap();
        assert_eq!(updated.activation_count, 5);
    }

    #[tokio::test]
    async fn shutdown_drains_pending_updates() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let input = event_input("drained on shutdown");
        let hash = input.content_hash();
        let event = store
            .event_insert(&project.id, &input, &hash, None, Utc::now())
            .unwrap();

        // Long interval: only the shutdown drain can write this
        let flusher = AccessFlusher::spawn(
            store.clone(),
            FlushConfig {
                queue_capacity: 64,
                flush_interval_ms: 60_000,
            },
        );
        flusher.handle().enqueue(AccessUpdate::Event {
            id: event.id.clone(),
            at: Utc::now(),
        });
        flusher.shutdown().await;

        assert_eq!(store.event_get(&event.id).unwrap().unwrap().activation_count, 1);
    }

    #[tokio::test]
    async fn unknown_ids_never_error() {
        let (store, _dir) = test_store();
        let flusher = AccessFlusher::spawn(store, FlushConfig::default());
        flusher.handle().enqueue(AccessUpdate::Semantic {
            id: "no-such-memory".into(),
            at: Utc::now(),
        });
        flusher.shutdown().await;
    }
}

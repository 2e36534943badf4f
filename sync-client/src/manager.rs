//! Sync queue manager.
//!
//! Replays pending mutations against the remote endpoint, oldest first and
//! strictly one at a time. A drain pass never fails: remote errors become
//! backoff reschedules and store errors are logged and counted.
//!
//! ```text
//! queue() ─▶ decide ─┬─ GiveUp    ─▶ bury
//!                    ├─ NotYetDue ─▶ leave
//!                    └─ Replay    ─▶ remote ─┬─ ok        ─▶ dequeue
//!                                            ├─ rejected  ─▶ bury
//!                                            └─ transient ─▶ reschedule (backoff)
//! ```

use chrono::{DateTime, Utc};
use cultura_sync_core::{after_failure, decide, sort_for_replay, BackoffPolicy, ReplayDecision};
use cultura_sync_types::{EntityId, EntityKind, SyncOperation, SyncQueueItem};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::remote::{RemoteEndpoint, RemoteError};
use crate::store::{LocalStore, StoreResult};

/// Counters for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items sent to the remote endpoint.
    pub attempted: usize,
    /// Items replayed and removed from the queue.
    pub succeeded: usize,
    /// Items whose replay failed and were rescheduled.
    pub failed: usize,
    /// Items left untouched (backoff pending, or blocked behind an earlier
    /// item for the same record).
    pub deferred: usize,
    /// Items moved to the dead-letter collection.
    pub dead_lettered: usize,
    /// Local store operations that failed during the pass.
    pub store_errors: usize,
}

/// Result of a drain request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The pass ran to completion.
    Completed(DrainReport),
    /// Another pass was in flight; this request was dropped.
    AlreadyRunning,
}

impl DrainOutcome {
    /// The report of a completed pass.
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            DrainOutcome::AlreadyRunning => None,
        }
    }
}

/// How a replay attempt failed.
enum ReplayError {
    Remote(RemoteError),
    Unreplayable(String),
}

/// Clears the syncing flag when a pass ends, however it ends.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
    activity: &'a watch::Sender<bool>,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool, activity: &'a watch::Sender<bool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        activity.send_replace(true);
        Some(Self { flag, activity })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.activity.send_replace(false);
    }
}

/// Drains the sync queue against a remote endpoint.
///
/// Cheap to clone; clones share the single-flight guard.
#[derive(Clone)]
pub struct SyncQueueManager {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteEndpoint>,
    policy: BackoffPolicy,
    syncing: Arc<AtomicBool>,
    activity: Arc<watch::Sender<bool>>,
}

impl SyncQueueManager {
    /// Create a manager over a store and a remote endpoint.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteEndpoint>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            policy,
            syncing: Arc::new(AtomicBool::new(false)),
            activity: Arc::new(watch::channel(false).0),
        }
    }

    /// The retry schedule in use.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// The store the queue lives in.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Whether a drain pass is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Subscribe to drain start (`true`) and end (`false`).
    pub fn subscribe_activity(&self) -> watch::Receiver<bool> {
        self.activity.subscribe()
    }

    /// Whether a pass at `now` would act on at least one item (replay it,
    /// or give up on it).
    pub async fn has_due_items(&self, now: DateTime<Utc>) -> StoreResult<bool> {
        let items = self.store.queue().await?;
        Ok(items
            .iter()
            .any(|item| decide(item, &self.policy, now) != ReplayDecision::NotYetDue))
    }

    /// Run one drain pass now.
    pub async fn process_queue(&self) -> DrainOutcome {
        self.process_queue_at(Utc::now()).await
    }

    /// Run one drain pass as if the current time were `now`.
    ///
    /// Only the items present when the pass starts are considered; items
    /// enqueued meanwhile wait for the next pass.
    pub async fn process_queue_at(&self, now: DateTime<Utc>) -> DrainOutcome {
        let Some(_guard) = DrainGuard::acquire(&self.syncing, &self.activity) else {
            tracing::debug!("Drain requested while another is running; dropped");
            return DrainOutcome::AlreadyRunning;
        };

        let mut report = DrainReport::default();

        let mut items = match self.store.queue().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Drain aborted, could not read sync queue: {}", e);
                report.store_errors += 1;
                return DrainOutcome::Completed(report);
            }
        };
        sort_for_replay(&mut items);

        if items.is_empty() {
            tracing::debug!("Drain: queue empty");
            return DrainOutcome::Completed(report);
        }
        tracing::info!("Drain started ({} queued)", items.len());

        // Enqueue positions of every still-queued item, per record. A record's
        // items replay in enqueue order, whatever their backoff timestamps.
        let mut queued: HashMap<(EntityKind, EntityId), BTreeSet<u64>> = HashMap::new();
        for item in &items {
            if let Some(id) = item.entity_id() {
                queued
                    .entry((item.entity_type, id))
                    .or_default()
                    .insert(item.seq);
            }
        }

        for item in items {
            let key = item.entity_id().map(|id| (item.entity_type, id));
            let decision = decide(&item, &self.policy, now);

            if decision == ReplayDecision::GiveUp {
                let reason = format!("gave up after {} retries", item.retries);
                if self.bury(&item, &reason, &mut report).await {
                    release(&mut queued, key.as_ref(), item.seq);
                }
                continue;
            }

            let first = key
                .as_ref()
                .and_then(|key| queued.get(key))
                .and_then(|seqs| seqs.first().copied());
            if first.is_some_and(|first| first < item.seq) {
                tracing::debug!("Drain: {} waits behind an earlier change", item.id);
                report.deferred += 1;
                continue;
            }

            if decision == ReplayDecision::NotYetDue {
                report.deferred += 1;
                continue;
            }

            match self.replay(&item).await {
                Ok(()) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                    release(&mut queued, key.as_ref(), item.seq);
                    if let Err(e) = self.store.dequeue(item.id).await {
                        tracing::error!("Replayed {} but could not dequeue it: {}", item.id, e);
                        report.store_errors += 1;
                    }
                }
                Err(ReplayError::Unreplayable(reason)) => {
                    if self.bury(&item, &reason, &mut report).await {
                        release(&mut queued, key.as_ref(), item.seq);
                    }
                }
                Err(ReplayError::Remote(e)) if e.is_permanent() => {
                    report.attempted += 1;
                    let reason = format!("rejected by remote: {}", e);
                    if self.bury(&item, &reason, &mut report).await {
                        release(&mut queued, key.as_ref(), item.seq);
                    }
                }
                Err(ReplayError::Remote(e)) => {
                    report.attempted += 1;
                    report.failed += 1;

                    let next = after_failure(&item, &self.policy, now);
                    tracing::warn!(
                        "Replay of {} {} ({}) failed (attempt {}): {}; next attempt at {}",
                        item.operation,
                        item.entity_type,
                        item.id,
                        next.retries,
                        e,
                        next.timestamp
                    );
                    if let Err(e) = self.store.reschedule(&next).await {
                        tracing::error!("Could not reschedule {}: {}", item.id, e);
                        report.store_errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Drain finished: {} succeeded, {} failed, {} deferred, {} dead-lettered",
            report.succeeded,
            report.failed,
            report.deferred,
            report.dead_lettered
        );
        DrainOutcome::Completed(report)
    }

    async fn replay(&self, item: &SyncQueueItem) -> Result<(), ReplayError> {
        let kind = item.entity_type;
        let result = match item.operation {
            SyncOperation::Create => self.remote.create(kind, &item.data).await,
            SyncOperation::Update => {
                let id = item
                    .entity_id()
                    .ok_or_else(|| ReplayError::Unreplayable("update payload has no id".into()))?;
                self.remote.update(kind, id.as_str(), &item.data).await
            }
            SyncOperation::Delete => {
                let id = item
                    .entity_id()
                    .ok_or_else(|| ReplayError::Unreplayable("delete payload has no id".into()))?;
                self.remote.delete(kind, id.as_str()).await
            }
        };
        result.map_err(ReplayError::Remote)
    }

    /// Move an item to the dead letters. Returns whether it left the queue.
    async fn bury(&self, item: &SyncQueueItem, reason: &str, report: &mut DrainReport) -> bool {
        match self.store.bury(item, reason).await {
            Ok(()) => {
                report.dead_lettered += 1;
                true
            }
            Err(e) => {
                tracing::error!("Could not dead-letter {}: {}", item.id, e);
                report.store_errors += 1;
                false
            }
        }
    }
}

/// Forget a queue position once its item has left the queue.
fn release(
    queued: &mut HashMap<(EntityKind, EntityId), BTreeSet<u64>>,
    key: Option<&(EntityKind, EntityId)>,
    seq: u64,
) {
    if let Some(seqs) = key.and_then(|key| queued.get_mut(key)) {
        seqs.remove(&seq);
    }
}

//! Connectivity observer.
//!
//! Tracks online/offline transitions through the pure [`Connectivity`]
//! machine and runs a drain whenever the device comes back online. It also
//! publishes the [`SyncStatus`] the UI shows: online flag, drain in flight
//! and number of pending changes.

use chrono::Utc;
use cultura_sync_core::{Connectivity, ConnectivityAction, ConnectivityEvent};
use cultura_sync_types::Collection;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::manager::{DrainOutcome, SyncQueueManager};
use crate::store::StoreResult;

/// What the UI reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the device is online.
    pub is_online: bool,
    /// Whether a drain pass is in flight.
    pub is_syncing: bool,
    /// Number of queued mutations, as of the last refresh.
    pub pending_changes: u64,
}

/// Reacts to connectivity changes and drives the queue manager.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectivityObserver {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    manager: SyncQueueManager,
    connectivity: Mutex<Connectivity>,
    status: watch::Sender<SyncStatus>,
}

impl ConnectivityObserver {
    /// Create an observer. The device is considered offline until told otherwise.
    pub fn new(manager: SyncQueueManager) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                manager,
                connectivity: Mutex::new(Connectivity::new()),
                status: watch::channel(SyncStatus::default()).0,
            }),
        }
    }

    /// The queue manager driven by this observer.
    pub fn manager(&self) -> &SyncQueueManager {
        &self.inner.manager
    }

    /// Whether the device is currently considered online.
    pub fn is_online(&self) -> bool {
        self.connectivity().is_online()
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_syncing: self.inner.manager.is_syncing(),
            ..*self.inner.status.borrow()
        }
    }

    /// Subscribe to status updates.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Apply a connectivity signal.
    ///
    /// On an offline to online transition exactly one drain is spawned and
    /// its handle returned; otherwise `None`. Must be called within a tokio
    /// runtime.
    pub fn set_online(&self, online: bool) -> Option<JoinHandle<DrainOutcome>> {
        let actions = {
            let mut connectivity = self
                .inner
                .connectivity
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (next, actions) = connectivity.on_signal(online);
            *connectivity = next;
            actions
        };

        self.publish(|status| status.is_online = online);

        let mut drain = None;
        for action in actions {
            match action {
                ConnectivityAction::EmitEvent(ConnectivityEvent::WentOnline) => {
                    tracing::info!("Connectivity: online");
                }
                ConnectivityAction::EmitEvent(ConnectivityEvent::WentOffline) => {
                    tracing::info!("Connectivity: offline");
                }
                ConnectivityAction::TriggerDrain => {
                    drain = Some(self.spawn_drain());
                }
            }
        }
        drain
    }

    /// Manual sync trigger.
    ///
    /// Returns `None` without touching the queue while offline. Otherwise
    /// runs a drain (or reports that one is already running).
    pub async fn sync_data(&self) -> Option<DrainOutcome> {
        if !self.is_online() {
            tracing::debug!("Sync requested while offline; skipped");
            return None;
        }
        Some(self.drain().await)
    }

    /// Re-read the queue size into the published status.
    pub async fn refresh_pending(&self) -> StoreResult<u64> {
        let pending = self
            .inner
            .manager
            .store()
            .count(Collection::SyncQueue)
            .await?;
        self.publish(|status| status.pending_changes = pending);
        Ok(pending)
    }

    /// Spawn the background loop.
    ///
    /// The loop applies every value of `signals` (starting with the current
    /// one) and republishes drain activity. Every `poll_interval` it
    /// refreshes the pending counter and, while online, starts a drain if
    /// some queued item's backoff has elapsed. It ends when the signal sender is
    /// dropped; abort the handle to stop it earlier.
    pub fn spawn(
        &self,
        mut signals: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = interval(poll_interval);
            let mut activity = this.inner.manager.subscribe_activity();

            let initial = *signals.borrow_and_update();
            this.set_online(initial);

            tracing::info!(
                "Connectivity observer started (poll interval: {}s)",
                poll_interval.as_secs_f32()
            );

            loop {
                tokio::select! {
                    changed = signals.changed() => {
                        if changed.is_err() {
                            tracing::info!("Connectivity signal closed; observer stopping");
                            break;
                        }
                        let online = *signals.borrow_and_update();
                        this.set_online(online);
                    }
                    _ = timer.tick() => this.on_tick().await,
                    Ok(()) = activity.changed() => {
                        let syncing = *activity.borrow_and_update();
                        this.publish(|status| status.is_syncing = syncing);
                    }
                }
            }
        })
    }

    async fn on_tick(&self) {
        let pending = match self.refresh_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Could not refresh pending changes: {}", e);
                return;
            }
        };
        if pending == 0 || !self.is_online() || self.inner.manager.is_syncing() {
            return;
        }

        match self.inner.manager.has_due_items(Utc::now()).await {
            Ok(true) => {
                tracing::debug!("Queued changes are due; draining");
                drop(self.spawn_drain());
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Could not inspect sync queue: {}", e),
        }
    }

    fn spawn_drain(&self) -> JoinHandle<DrainOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.drain().await })
    }

    async fn drain(&self) -> DrainOutcome {
        let outcome = self.inner.manager.process_queue().await;
        if let Err(e) = self.refresh_pending().await {
            tracing::warn!("Could not refresh pending changes: {}", e);
        }
        self.publish(|status| status.is_syncing = self.inner.manager.is_syncing());
        outcome
    }

    fn connectivity(&self) -> Connectivity {
        *self
            .inner
            .connectivity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: impl FnOnce(&mut SyncStatus)) {
        self.inner.status.send_modify(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use crate::store::{LocalStore, SqliteStore};
    use cultura_sync_core::BackoffPolicy;
    use cultura_sync_types::{EntityKind, NewSyncQueueItem, SyncOperation};
    use serde_json::json;

    async fn setup() -> (ConnectivityObserver, Arc<SqliteStore>, MockRemote) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let remote = MockRemote::new();
        let manager = SyncQueueManager::new(
            store.clone(),
            Arc::new(remote.clone()),
            BackoffPolicy::default(),
        );
        (ConnectivityObserver::new(manager), store, remote)
    }

    async fn enqueue(store: &SqliteStore, id: &str) {
        store
            .enqueue(NewSyncQueueItem::new(
                SyncOperation::Create,
                EntityKind::Contact,
                json!({ "id": id, "name": id }),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn starts_offline() {
        let (observer, _, _) = setup().await;
        assert!(!observer.is_online());
        assert_eq!(observer.status(), SyncStatus::default());
    }

    #[tokio::test]
    async fn going_online_drains_once() {
        let (observer, store, remote) = setup().await;
        enqueue(&store, "a").await;

        let handle = observer.set_online(true).expect("drain on reconnect");
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(observer.status().pending_changes, 0);
        assert!(observer.status().is_online);

        // Staying online does not drain again.
        assert!(observer.set_online(true).is_none());
    }

    #[tokio::test]
    async fn going_offline_does_not_drain() {
        let (observer, _, _) = setup().await;
        observer.set_online(true).unwrap().await.unwrap();

        assert!(observer.set_online(false).is_none());
        assert!(!observer.status().is_online);
    }

    #[tokio::test]
    async fn sync_data_is_skipped_offline() {
        let (observer, store, remote) = setup().await;
        enqueue(&store, "a").await;

        assert_eq!(observer.sync_data().await, None);
        assert!(remote.calls().is_empty());
        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rapid_sync_requests_run_one_drain() {
        let (observer, store, remote) = setup().await;
        observer.set_online(true).unwrap().await.unwrap();
        enqueue(&store, "a").await;
        remote.hold();

        let first = tokio::spawn({
            let observer = observer.clone();
            async move { observer.sync_data().await }
        });
        remote.wait_for_calls(1).await;
        assert!(observer.status().is_syncing);

        let second = observer.sync_data().await;
        assert_eq!(second, Some(DrainOutcome::AlreadyRunning));

        remote.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.report().map(|r| r.succeeded), Some(1));
        assert_eq!(remote.calls().len(), 1);
        assert!(!observer.status().is_syncing);
    }

    #[tokio::test]
    async fn refresh_pending_publishes_queue_size() {
        let (observer, store, _) = setup().await;
        let mut updates = observer.subscribe();
        enqueue(&store, "a").await;
        enqueue(&store, "b").await;

        assert_eq!(observer.refresh_pending().await.unwrap(), 2);
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().pending_changes, 2);
    }

    #[tokio::test]
    async fn background_loop_follows_signal() {
        let (observer, store, remote) = setup().await;
        enqueue(&store, "a").await;
        observer.refresh_pending().await.unwrap();
        let (signal, signals) = watch::channel(false);

        let handle = observer.spawn(signals, Duration::from_millis(10));
        let mut updates = observer.subscribe();

        signal.send(true).unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|s| s.is_online && s.pending_changes == 0),
        )
        .await
        .expect("drain after reconnect")
        .unwrap();
        assert_eq!(remote.calls().len(), 1);

        drop(signal);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop ends when the signal closes")
            .unwrap();
    }

    #[tokio::test]
    async fn flapping_connectivity_never_overlaps_drains() {
        let (observer, store, remote) = setup().await;
        enqueue(&store, "a").await;
        remote.hold();

        let first = observer.set_online(true).unwrap();
        remote.wait_for_calls(1).await;
        observer.set_online(false);
        let second = observer.set_online(true).unwrap();

        // The second drain finds the first still running.
        assert_eq!(second.await.unwrap(), DrainOutcome::AlreadyRunning);

        remote.release();
        assert_eq!(first.await.unwrap().report().map(|r| r.succeeded), Some(1));
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn background_loop_retries_failed_change() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let remote = MockRemote::new();
        let policy = BackoffPolicy::new().with_base(Duration::from_millis(10));
        let manager = SyncQueueManager::new(store.clone(), Arc::new(remote.clone()), policy);
        let observer = ConnectivityObserver::new(manager);

        remote.fail_next(1);
        enqueue(&store, "a").await;
        let (_signal, signals) = watch::channel(true);
        let handle = observer.spawn(signals, Duration::from_millis(10));

        // The first attempt fails; a later tick replays it once the backoff elapses.
        tokio::time::timeout(Duration::from_secs(5), remote.wait_for_calls(2))
            .await
            .expect("failed change retried while online");
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.count(Collection::SyncQueue).await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue drained");

        assert_eq!(remote.calls().len(), 2);
        handle.abort();
    }
}

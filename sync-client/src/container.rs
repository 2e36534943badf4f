//! State container: the single owner of the in-memory [`AppState`].
//!
//! `dispatch` is write-through. The next state is computed by the pure
//! reducer, committed to the store (snapshot, collections and sync queue
//! in one transaction) while the write lock is held, and only then made
//! visible. If the commit fails, the state is left as it was.

use chrono::{DateTime, NaiveDate, Utc};
use cultura_sync_core::{query, snapshot, Action, AppState, Change, SnapshotError};
use cultura_sync_types::Entity;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::store::{LocalStore, StateWrite, StoreError};

/// State container errors.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The store failed; the in-memory state was not changed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The persisted snapshot could not be read.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A record could not be serialized for the sync queue.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Owns the application state and keeps the store in step with it.
pub struct StateContainer {
    store: Arc<dyn LocalStore>,
    state: RwLock<AppState>,
}

impl StateContainer {
    /// Load the last snapshot from `store`, or start empty.
    ///
    /// Snapshots written with an older schema are migrated and rewritten
    /// in the current one.
    pub async fn hydrate(store: Arc<dyn LocalStore>) -> Result<Self, ContainerError> {
        let state = match store.read_snapshot().await? {
            None => {
                tracing::debug!("No snapshot found, starting empty");
                AppState::new()
            }
            Some(text) => {
                let decoded = snapshot::decode(&text)?;
                for reason in &decoded.skipped {
                    tracing::warn!("Dropped unreadable snapshot record {}", reason);
                }
                if decoded.needs_rewrite() {
                    tracing::info!(
                        "Migrating snapshot from schema v{} to v{}",
                        decoded.version,
                        snapshot::SCHEMA_VERSION
                    );
                    let body = snapshot::encode(&decoded.state)?;
                    store
                        .commit(StateWrite::reload(body, decoded.state.all_entities()))
                        .await?;
                }
                decoded.state
            }
        };

        tracing::info!("Hydrated state ({} records)", state.len());
        Ok(Self {
            store,
            state: RwLock::new(state),
        })
    }

    /// The store backing this container.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Apply an action, persist the result, then publish it.
    ///
    /// Returns the changes that were committed (and queued for replay).
    pub async fn dispatch(&self, action: Action) -> Result<Vec<Change>, ContainerError> {
        let name = action.name();
        let reload = matches!(action, Action::LoadState(_));

        let mut state = self.state.write().await;
        let (next, changes) = state.clone().apply(action);

        if changes.is_empty() && !reload {
            tracing::debug!("{}: nothing changed", name);
            return Ok(changes);
        }

        let body = snapshot::encode(&next)?;
        let write = if reload {
            StateWrite::reload(body, next.all_entities())
        } else {
            StateWrite::from_changes(body, &changes)?
        };

        if let Err(e) = self.store.commit(write).await {
            tracing::error!("{}: could not persist state, change discarded: {}", name, e);
            return Err(e.into());
        }

        *state = next;
        tracing::debug!("{}: committed {} change(s)", name, changes.len());
        Ok(changes)
    }

    /// A copy of the current state.
    pub async fn state(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// Every favorited record.
    pub async fn favorites(&self) -> Vec<Entity> {
        query::favorites(&*self.state.read().await)
    }

    /// Case-insensitive text search.
    pub async fn search(&self, text: &str) -> Vec<Entity> {
        query::search(&*self.state.read().await, text)
    }

    /// Calendar view for one day.
    pub async fn on_day(&self, day: NaiveDate) -> Vec<Entity> {
        query::on_day(&*self.state.read().await, day)
    }

    /// What is coming up in the next `days` days.
    pub async fn upcoming(&self, from: DateTime<Utc>, days: u32) -> Vec<Entity> {
        query::upcoming(&*self.state.read().await, from, days)
    }
}

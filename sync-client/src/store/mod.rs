//! Persistent local store.
//!
//! Holds the entity collections, the sync queue, the dead-letter collection
//! and the last state snapshot. Every operation is durable before it
//! returns.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use cultura_sync_core::Change;
use cultura_sync_types::{
    Collection, DataError, DeadLetter, Entity, EntityId, EntityKind, NewSyncQueueItem,
    QueueItemId, SyncOperation, SyncQueueItem,
};
use std::path::PathBuf;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value does not match the data model.
    #[error("invalid stored data: {0}")]
    Data(#[from] DataError),

    /// A stored row is unreadable.
    #[error("corrupt row in {collection}: {reason}")]
    Corrupt {
        /// Collection the row belongs to.
        collection: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The record has no usable id.
    #[error("record in {collection} has no id")]
    MissingId {
        /// Collection the record was written to.
        collection: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One entity-collection write inside a [`StateWrite`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordWrite {
    /// Insert or overwrite the record.
    Put(Entity),
    /// Remove the record.
    Delete(EntityKind, EntityId),
}

/// Everything persisted for one dispatched action, committed atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct StateWrite {
    /// Versioned snapshot of the whole state.
    pub snapshot: String,
    /// When set, every entity collection is cleared before `records` apply.
    pub replace_all: bool,
    /// Per-record writes to the entity collections.
    pub records: Vec<RecordWrite>,
    /// Mutations to append to the sync queue.
    pub enqueue: Vec<NewSyncQueueItem>,
}

impl StateWrite {
    /// Persist the outcome of an incremental action.
    ///
    /// Each change is mirrored in its entity collection and queued for replay.
    pub fn from_changes(snapshot: String, changes: &[Change]) -> Result<Self, serde_json::Error> {
        let mut records = Vec::with_capacity(changes.len());
        let mut enqueue = Vec::with_capacity(changes.len());

        for change in changes {
            records.push(match change.operation {
                SyncOperation::Delete => RecordWrite::Delete(change.kind(), change.id().clone()),
                SyncOperation::Create | SyncOperation::Update => {
                    RecordWrite::Put(change.entity.clone())
                }
            });
            enqueue.push(change.to_queue_item()?);
        }

        Ok(Self {
            snapshot,
            replace_all: false,
            records,
            enqueue,
        })
    }

    /// Replace every entity collection with `entities`. Nothing is queued.
    pub fn reload(snapshot: String, entities: Vec<Entity>) -> Self {
        Self {
            snapshot,
            replace_all: true,
            records: entities.into_iter().map(RecordWrite::Put).collect(),
            enqueue: Vec::new(),
        }
    }
}

/// Trait for local storage backends.
///
/// `put`, `delete`, `all` and `count` work on every [`Collection`]. Records
/// in `syncQueue` and `deadLetters` must deserialize as [`SyncQueueItem`]
/// and [`DeadLetter`] respectively.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or overwrite a record by id. Idempotent.
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        record: &serde_json::Value,
    ) -> StoreResult<()>;

    /// Remove a record by id. No-op if absent.
    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Every record of a collection.
    ///
    /// `syncQueue` is ordered by timestamp (ties by insertion order); other
    /// collections by insertion order.
    async fn all(&self, collection: Collection) -> StoreResult<Vec<serde_json::Value>>;

    /// Number of records in a collection.
    async fn count(&self, collection: Collection) -> StoreResult<u64>;

    /// Append a mutation to the sync queue with a fresh id, the current time and no retries.
    async fn enqueue(&self, item: NewSyncQueueItem) -> StoreResult<SyncQueueItem>;

    /// The sync queue, oldest timestamp first.
    async fn queue(&self) -> StoreResult<Vec<SyncQueueItem>>;

    /// Persist the `timestamp` and `retries` of an existing queue item.
    async fn reschedule(&self, item: &SyncQueueItem) -> StoreResult<()>;

    /// Remove a queue item after a successful replay.
    async fn dequeue(&self, id: QueueItemId) -> StoreResult<()>;

    /// Move a queue item to the dead-letter collection.
    async fn bury(&self, item: &SyncQueueItem, reason: &str) -> StoreResult<()>;

    /// Every dead letter, oldest first.
    async fn dead_letters(&self) -> StoreResult<Vec<DeadLetter>>;

    /// Delete every dead letter. Returns how many were removed.
    async fn purge_dead_letters(&self) -> StoreResult<u64>;

    /// Move every dead letter back into the queue with `retries = 0`.
    async fn requeue_dead_letters(&self) -> StoreResult<u64>;

    /// Apply a [`StateWrite`] in a single transaction.
    async fn commit(&self, write: StateWrite) -> StoreResult<()>;

    /// The last committed snapshot, if any.
    async fn read_snapshot(&self) -> StoreResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use cultura_sync_core::{Action, AppState};
    use cultura_sync_types::{Contact, Task};

    #[test]
    fn from_changes_mirrors_and_queues_each_change() {
        let task = Task::new("Print tickets");
        let (state, added) = AppState::new().apply(Action::AddTask(task.clone()));
        let (_, deleted) = state.apply(Action::DeleteTask(task.id.clone()));

        let changes: Vec<Change> = added.into_iter().chain(deleted).collect();
        let write = StateWrite::from_changes("{}".into(), &changes).unwrap();

        assert!(!write.replace_all);
        assert_eq!(
            write.records,
            vec![
                RecordWrite::Put(Entity::Task(task.clone())),
                RecordWrite::Delete(EntityKind::Task, task.id.clone()),
            ]
        );
        assert_eq!(write.enqueue.len(), 2);
        assert_eq!(write.enqueue[1].operation, SyncOperation::Delete);
        assert_eq!(write.enqueue[1].entity_id(), Some(task.id));
    }

    #[test]
    fn reload_queues_nothing() {
        let contact = Contact::new("Ana");
        let write = StateWrite::reload("{}".into(), vec![Entity::Contact(contact)]);

        assert!(write.replace_all);
        assert_eq!(write.records.len(), 1);
        assert!(write.enqueue.is_empty());
    }
}

//! Pending remote mutations.
//!
//! A [`SyncQueueItem`] records one create/update/delete that still has to be
//! replayed against the remote endpoint. Items flow through the queue in
//! this order:
//! 1. enqueue - id, timestamp and `retries = 0` are assigned by the store
//! 2. replay succeeds - the item is removed
//! 3. replay fails - `retries` is incremented and `timestamp` pushed forward
//! 4. retries exhausted - the item is moved to the dead-letter collection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::EntityKind;
use crate::error::DataError;
use crate::ids::{EntityId, QueueItemId};

/// Kind of remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// Create the record remotely.
    Create,
    /// Replace the remote record.
    Update,
    /// Delete the remote record.
    Delete,
}

impl SyncOperation {
    /// The tag stored in the queue table.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncOperation::Create),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            other => Err(DataError::UnknownOperation(other.to_string())),
        }
    }
}

/// A mutation to enqueue (a queue item minus id, timestamp and retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSyncQueueItem {
    /// Operation to replay.
    pub operation: SyncOperation,
    /// Entity type tag.
    pub entity_type: EntityKind,
    /// Snapshot of the entity payload at mutation time.
    pub data: serde_json::Value,
}

impl NewSyncQueueItem {
    /// Create a new pending mutation.
    pub fn new(operation: SyncOperation, entity_type: EntityKind, data: serde_json::Value) -> Self {
        Self {
            operation,
            entity_type,
            data,
        }
    }

    /// Identifier of the entity this mutation targets, read from the payload.
    pub fn entity_id(&self) -> Option<EntityId> {
        payload_id(&self.data)
    }
}

/// A pending mutation stored in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Unique queue item identifier.
    pub id: QueueItemId,
    /// Operation to replay.
    pub operation: SyncOperation,
    /// Entity type tag.
    pub entity_type: EntityKind,
    /// Snapshot of the entity payload at mutation time.
    pub data: serde_json::Value,
    /// Earliest time the item may be replayed; also the queue sort key.
    pub timestamp: DateTime<Utc>,
    /// Number of failed replay attempts so far.
    pub retries: u32,
    /// Enqueue order, assigned by the store (0 until stored). Unlike
    /// `timestamp` it never moves, so it orders changes to the same record.
    #[serde(default)]
    pub seq: u64,
}

impl SyncQueueItem {
    /// Materialize a pending mutation with a fresh id, `now` as timestamp and no retries.
    pub fn from_new(item: NewSyncQueueItem, now: DateTime<Utc>) -> Self {
        Self {
            id: QueueItemId::new(),
            operation: item.operation,
            entity_type: item.entity_type,
            data: item.data,
            timestamp: now,
            retries: 0,
            seq: 0,
        }
    }

    /// Identifier of the entity this item targets, read from the payload.
    pub fn entity_id(&self) -> Option<EntityId> {
        payload_id(&self.data)
    }
}

/// A queue item that will not be replayed again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// The item as it was when it was given up on.
    pub item: SyncQueueItem,
    /// Why the item was given up on.
    pub reason: String,
    /// When the item was moved out of the queue.
    pub buried_at: DateTime<Utc>,
}

fn payload_id(data: &serde_json::Value) -> Option<EntityId> {
    match data.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(EntityId::from_string(s.clone())),
        serde_json::Value::Number(n) => Some(EntityId::from_string(n.to_string())),
        _ => None,
    }
}

//! # sync-types
//!
//! Data model for the Cultura offline-first sync core.
//!
//! This crate provides the foundational types used across all Cultura crates:
//! - [`EntityId`], [`QueueItemId`] - Identity types
//! - [`Event`], [`Birthday`], [`Task`], [`Contact`], [`Article`] - Domain records
//! - [`EntityKind`], [`Collection`] - Entity type tags and store collection names
//! - [`SyncQueueItem`], [`NewSyncQueueItem`], [`DeadLetter`] - Pending remote mutations
//! - [`DataError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entity;
mod error;
mod ids;
mod queue;

pub use entity::{
    Article, Birthday, Collection, Contact, Entity, EntityKind, Event, Record, Task, TaskPriority,
};
pub use error::DataError;
pub use ids::{EntityId, QueueItemId};
pub use queue::{DeadLetter, NewSyncQueueItem, SyncOperation, SyncQueueItem};

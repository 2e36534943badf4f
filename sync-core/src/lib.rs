//! # sync-core
//!
//! Pure logic for the Cultura sync core (no I/O, instant tests).
//!
//! This crate implements the reducer, retry scheduling, connectivity state
//! machine and snapshot schema without any network or disk I/O, enabling
//! fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output, time is a parameter)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (SQLite, remote endpoint) is performed by `sync-client`,
//! which persists the changes and interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod connectivity;
pub mod import;
pub mod query;
pub mod retry;
pub mod snapshot;
pub mod state;

pub use backoff::{BackoffPolicy, DEFAULT_MAX_RETRIES};
pub use connectivity::{Connectivity, ConnectivityAction, ConnectivityEvent};
pub use import::{merge_contacts, ContactMerge};
pub use retry::{after_failure, decide, sort_for_replay, ReplayDecision};
pub use snapshot::{DecodedSnapshot, SnapshotError, SCHEMA_VERSION};
pub use state::{Action, AppState, Change};

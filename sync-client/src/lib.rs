//! # sync-client
//!
//! Offline-first persistence and sync for Cultura.
//!
//! This is the I/O half of the sync core: it persists what the pure reducer
//! in `sync-core` produces and replays queued mutations against a remote
//! endpoint when connectivity allows.
//!
//! ## Components
//!
//! - **Local store**: SQLite (WAL, `synchronous = FULL`) behind the [`LocalStore`] trait
//! - **State container**: write-through owner of the [`AppState`](cultura_sync_core::AppState)
//! - **Sync queue manager**: single-flight, ordered, backoff-aware drain
//! - **Connectivity observer**: drains on reconnect, publishes [`SyncStatus`]
//! - **Remote endpoint**: pluggable ([`HttpRemote`], [`MockRemote`])
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cultura_sync_client::{ConnectivityObserver, MockRemote, SqliteStore, StateContainer, SyncQueueManager};
//!
//! let store = Arc::new(SqliteStore::new(&path).await?);
//! let container = StateContainer::hydrate(store.clone()).await?;
//! container.dispatch(Action::AddEvent(event)).await?;
//!
//! let manager = SyncQueueManager::new(store, Arc::new(MockRemote::new()), BackoffPolicy::default());
//! let observer = ConnectivityObserver::new(manager);
//! if let Some(drain) = observer.set_online(true) {
//!     drain.await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod container;
pub mod manager;
pub mod observer;
pub mod remote;
pub mod store;

pub use config::{ClientConfig, ConfigError, CONFIG_FILE_NAME};
pub use container::{ContainerError, StateContainer};
pub use manager::{DrainOutcome, DrainReport, SyncQueueManager};
pub use observer::{ConnectivityObserver, SyncStatus};
pub use remote::{HttpRemote, MockCall, MockRemote, RemoteEndpoint, RemoteError};
pub use store::{LocalStore, RecordWrite, SqliteStore, StateWrite, StoreError, StoreResult};

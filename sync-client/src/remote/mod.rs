//! Remote sync endpoint abstraction.
//!
//! The queue manager replays pending mutations through this trait. Errors
//! are transient (rescheduled with backoff) unless
//! [`RemoteError::is_permanent`] says retrying cannot help.
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! remote.create(EntityKind::Event, &payload).await?;
//! assert_eq!(remote.calls().len(), 1);
//! ```

mod http;
mod mock;

pub use http::HttpRemote;
pub use mock::{MockCall, MockRemote};

use async_trait::async_trait;
use cultura_sync_types::EntityKind;
use thiserror::Error;

/// Remote endpoint errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The endpoint could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The request timed out.
    #[error("remote request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("remote rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint configuration is unusable.
    #[error("invalid remote configuration: {0}")]
    InvalidConfig(String),
}

impl RemoteError {
    /// Whether the endpoint refused the request itself, so a retry would
    /// get the same answer. Client errors other than 408 and 429.
    pub fn is_permanent(&self) -> bool {
        match self {
            RemoteError::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}

/// Remote endpoint for replaying local mutations.
///
/// Implementations decide the wire format; the payload is the entity as
/// serialized in the local store.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Create the record remotely.
    async fn create(&self, kind: EntityKind, payload: &serde_json::Value) -> Result<(), RemoteError>;

    /// Replace the remote record with the given id.
    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), RemoteError>;

    /// Delete the remote record with the given id.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError>;
}

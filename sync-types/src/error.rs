//! Error types for the Cultura data model.

use thiserror::Error;

/// Errors raised while interpreting stored or queued data.
#[derive(Debug, Error)]
pub enum DataError {
    /// A collection name that does not map to any known collection.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// An entity type tag that does not map to any known entity kind.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// An operation tag that is not create, update or delete.
    #[error("unknown sync operation: {0}")]
    UnknownOperation(String),

    /// A payload that cannot be decoded into the expected record.
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        /// Entity kind the payload was decoded as.
        kind: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A payload without a usable `id` field.
    #[error("payload has no id")]
    MissingId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DataError::UnknownCollection("films".into());
        assert_eq!(err.to_string(), "unknown collection: films");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DataError>();
    }
}

//! Identity types for Cultura records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a domain entity (event, birthday, task, contact, article).
///
/// Generated once at creation as a UUID v4 string and never changed by
/// updates. Stored and transmitted as a plain string so identifiers created
/// by older clients (which are not necessarily UUIDs) keep working.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new random EntityId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// Identifier of a pending sync queue item.
///
/// UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(uuid::Uuid);

impl QueueItemId {
    /// Create a new random QueueItemId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a QueueItemId from its hyphenated string form.
    pub fn parse(value: &str) -> Option<Self> {
        uuid::Uuid::parse_str(value).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueItemId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_unique() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_is_uuid_string() {
        let id = EntityId::new();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn entity_id_accepts_legacy_values() {
        let id = EntityId::from("1714557600000");
        assert_eq!(id.as_str(), "1714557600000");
        assert_eq!(id.to_string(), "1714557600000");
    }

    #[test]
    fn entity_id_serializes_as_plain_string() {
        let id = EntityId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn queue_item_id_is_uuid_v4() {
        let id = QueueItemId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn queue_item_id_parse() {
        let id = QueueItemId::new();
        assert_eq!(QueueItemId::parse(&id.to_string()), Some(id));
        assert!(QueueItemId::parse("not-a-uuid").is_none());
    }
}

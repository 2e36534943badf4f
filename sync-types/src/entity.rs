//! Domain records owned by the state container.
//!
//! Every record carries a stable [`EntityId`] and an `isFavorite` flag.
//! Records serialize in camelCase so persisted snapshots and remote payloads
//! share a single JSON shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;
use crate::ids::EntityId;

/// Entity type tag carried by queue items and remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A cultural event.
    Event,
    /// A birthday reminder.
    Birthday,
    /// A to-do task.
    Task,
    /// An address book contact.
    Contact,
    /// A press article.
    Article,
}

impl EntityKind {
    /// All entity kinds, in collection order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Event,
        EntityKind::Birthday,
        EntityKind::Task,
        EntityKind::Contact,
        EntityKind::Article,
    ];

    /// The tag used on the wire and in the queue table.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Event => "event",
            EntityKind::Birthday => "birthday",
            EntityKind::Task => "task",
            EntityKind::Contact => "contact",
            EntityKind::Article => "article",
        }
    }

    /// The store collection holding records of this kind.
    pub fn collection(&self) -> Collection {
        match self {
            EntityKind::Event => Collection::Events,
            EntityKind::Birthday => Collection::Birthdays,
            EntityKind::Task => Collection::Tasks,
            EntityKind::Contact => Collection::Contacts,
            EntityKind::Article => Collection::Articles,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(EntityKind::Event),
            "birthday" => Ok(EntityKind::Birthday),
            "task" => Ok(EntityKind::Task),
            "contact" => Ok(EntityKind::Contact),
            "article" => Ok(EntityKind::Article),
            other => Err(DataError::UnknownEntityType(other.to_string())),
        }
    }
}

/// A named collection in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// `events`
    Events,
    /// `birthdays`
    Birthdays,
    /// `tasks`
    Tasks,
    /// `contacts`
    Contacts,
    /// `articles`
    Articles,
    /// `syncQueue` - pending remote mutations.
    SyncQueue,
    /// `deadLetters` - queue items that were given up on.
    DeadLetters,
}

impl Collection {
    /// Collection name as used by the store.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Birthdays => "birthdays",
            Collection::Tasks => "tasks",
            Collection::Contacts => "contacts",
            Collection::Articles => "articles",
            Collection::SyncQueue => "syncQueue",
            Collection::DeadLetters => "deadLetters",
        }
    }

    /// The entity kind stored in this collection, if it is an entity collection.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Collection::Events => Some(EntityKind::Event),
            Collection::Birthdays => Some(EntityKind::Birthday),
            Collection::Tasks => Some(EntityKind::Task),
            Collection::Contacts => Some(EntityKind::Contact),
            Collection::Articles => Some(EntityKind::Article),
            Collection::SyncQueue | Collection::DeadLetters => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(Collection::Events),
            "birthdays" => Ok(Collection::Birthdays),
            "tasks" => Ok(Collection::Tasks),
            "contacts" => Ok(Collection::Contacts),
            "articles" => Ok(Collection::Articles),
            "syncQueue" => Ok(Collection::SyncQueue),
            "deadLetters" => Ok(Collection::DeadLetters),
            other => Err(DataError::UnknownCollection(other.to_string())),
        }
    }
}

/// Common behaviour of every domain record.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The entity kind of this record type.
    const KIND: EntityKind;

    /// Stable identifier.
    fn id(&self) -> &EntityId;

    /// Whether the user marked this record as a favorite.
    fn is_favorite(&self) -> bool;

    /// Set or clear the favorite flag.
    fn set_favorite(&mut self, favorite: bool);

    /// Wrap the record in an [`Entity`].
    fn into_entity(self) -> Entity;
}

macro_rules! impl_record {
    ($ty:ident, $kind:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn is_favorite(&self) -> bool {
                self.is_favorite
            }

            fn set_favorite(&mut self, favorite: bool) {
                self.is_favorite = favorite;
            }

            fn into_entity(self) -> Entity {
                Entity::$kind(self)
            }
        }
    };
}

/// A cultural event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stable identifier.
    pub id: EntityId,
    /// Event title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Start date and time.
    pub date: DateTime<Utc>,
    /// Optional end date and time.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Venue or address.
    #[serde(default)]
    pub location: String,
    /// Category label (concert, exhibition, ...).
    #[serde(default)]
    pub category: String,
    /// Optional poster image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Event {
    /// Create a new event with a fresh id.
    pub fn new(title: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::new(),
            title: title.into(),
            description: String::new(),
            date,
            end_date: None,
            location: String::new(),
            category: String::new(),
            image_url: None,
            is_favorite: false,
        }
    }
}

impl_record!(Event, Event);

/// A birthday reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Birthday {
    /// Stable identifier.
    pub id: EntityId,
    /// Person whose birthday it is.
    pub name: String,
    /// Birth date.
    pub date: NaiveDate,
    /// Linked contact, if any.
    #[serde(default)]
    pub contact_id: Option<EntityId>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Birthday {
    /// Create a new birthday with a fresh id.
    pub fn new(name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            date,
            contact_id: None,
            notes: None,
            is_favorite: false,
        }
    }
}

impl_record!(Birthday, Birthday);

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

/// A to-do task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier.
    pub id: EntityId,
    /// Task title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Whether the task is done.
    #[serde(default)]
    pub completed: bool,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Task {
    /// Create a new open task with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            title: title.into(),
            description: String::new(),
            due_date: None,
            priority: TaskPriority::default(),
            completed: false,
            is_favorite: false,
        }
    }
}

impl_record!(Task, Task);

/// An address book contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Stable identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Email address; the key used to skip duplicates on import.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Organization or institution.
    #[serde(default)]
    pub organization: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Contact {
    /// Create a new contact with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            email: None,
            phone: None,
            organization: None,
            notes: None,
            is_favorite: false,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl_record!(Contact, Contact);

/// A press article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Stable identifier.
    pub id: EntityId,
    /// Headline.
    pub title: String,
    /// Newspaper, magazine or site that published it.
    #[serde(default)]
    pub outlet: String,
    /// Link to the article.
    #[serde(default)]
    pub url: String,
    /// Publication date.
    pub published_at: DateTime<Utc>,
    /// Short summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Article {
    /// Create a new article with a fresh id.
    pub fn new(title: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::new(),
            title: title.into(),
            outlet: String::new(),
            url: String::new(),
            published_at,
            summary: None,
            is_favorite: false,
        }
    }
}

impl_record!(Article, Article);

/// Any domain record, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// An event.
    Event(Event),
    /// A birthday.
    Birthday(Birthday),
    /// A task.
    Task(Task),
    /// A contact.
    Contact(Contact),
    /// An article.
    Article(Article),
}

impl Entity {
    /// Kind of the wrapped record.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Event(_) => EntityKind::Event,
            Entity::Birthday(_) => EntityKind::Birthday,
            Entity::Task(_) => EntityKind::Task,
            Entity::Contact(_) => EntityKind::Contact,
            Entity::Article(_) => EntityKind::Article,
        }
    }

    /// Identifier of the wrapped record.
    pub fn id(&self) -> &EntityId {
        match self {
            Entity::Event(r) => &r.id,
            Entity::Birthday(r) => &r.id,
            Entity::Task(r) => &r.id,
            Entity::Contact(r) => &r.id,
            Entity::Article(r) => &r.id,
        }
    }

    /// Favorite flag of the wrapped record.
    pub fn is_favorite(&self) -> bool {
        match self {
            Entity::Event(r) => r.is_favorite,
            Entity::Birthday(r) => r.is_favorite,
            Entity::Task(r) => r.is_favorite,
            Entity::Contact(r) => r.is_favorite,
            Entity::Article(r) => r.is_favorite,
        }
    }

    /// Human-readable label (title or name).
    pub fn label(&self) -> &str {
        match self {
            Entity::Event(r) => &r.title,
            Entity::Birthday(r) => &r.name,
            Entity::Task(r) => &r.title,
            Entity::Contact(r) => &r.name,
            Entity::Article(r) => &r.title,
        }
    }

    /// Serialize the wrapped record into its JSON payload.
    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Entity::Event(r) => serde_json::to_value(r),
            Entity::Birthday(r) => serde_json::to_value(r),
            Entity::Task(r) => serde_json::to_value(r),
            Entity::Contact(r) => serde_json::to_value(r),
            Entity::Article(r) => serde_json::to_value(r),
        }
    }

    /// Decode a JSON payload as a record of the given kind.
    pub fn from_payload(kind: EntityKind, payload: serde_json::Value) -> Result<Self, DataError> {
        fn decode<R: Record>(payload: serde_json::Value) -> Result<Entity, DataError> {
            serde_json::from_value::<R>(payload)
                .map(Record::into_entity)
                .map_err(|source| DataError::InvalidPayload {
                    kind: R::KIND.to_string(),
                    source,
                })
        }

        match kind {
            EntityKind::Event => decode::<Event>(payload),
            EntityKind::Birthday => decode::<Birthday>(payload),
            EntityKind::Task => decode::<Task>(payload),
            EntityKind::Contact => decode::<Contact>(payload),
            EntityKind::Article => decode::<Article>(payload),
        }
    }
}

//! Application state and its reducer.
//!
//! [`AppState`] is the single source of truth for every domain record held
//! in memory. [`AppState::apply`] is a pure transition: it takes an
//! [`Action`] and produces the next state plus the list of [`Change`]s the
//! caller must persist and queue for the remote endpoint.
//!
//! The actual persistence is performed by sync-client, not by this module.

use cultura_sync_types::{
    Article, Birthday, Contact, Entity, EntityId, EntityKind, Event, NewSyncQueueItem, Record,
    SyncOperation, Task,
};
use serde::{Deserialize, Serialize};

use crate::import::merge_contacts;

/// All domain records, one list per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Cultural events.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Birthday reminders.
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
    /// To-do tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Address book.
    #[serde(default)]
    pub contacts: Vec<Contact>,
    /// Press articles.
    #[serde(default)]
    pub articles: Vec<Article>,
}

/// Actions accepted by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Add a new event.
    AddEvent(Event),
    /// Replace an existing event (matched by id).
    UpdateEvent(Event),
    /// Remove an event.
    DeleteEvent(EntityId),
    /// Add a new birthday.
    AddBirthday(Birthday),
    /// Replace an existing birthday (matched by id).
    UpdateBirthday(Birthday),
    /// Remove a birthday.
    DeleteBirthday(EntityId),
    /// Add a new task.
    AddTask(Task),
    /// Replace an existing task (matched by id).
    UpdateTask(Task),
    /// Remove a task.
    DeleteTask(EntityId),
    /// Add a new contact.
    AddContact(Contact),
    /// Replace an existing contact (matched by id).
    UpdateContact(Contact),
    /// Remove a contact.
    DeleteContact(EntityId),
    /// Add a new article.
    AddArticle(Article),
    /// Replace an existing article (matched by id).
    UpdateArticle(Article),
    /// Remove an article.
    DeleteArticle(EntityId),
    /// Flip the favorite flag of any record.
    ToggleFavorite {
        /// Kind of the record.
        kind: EntityKind,
        /// Identifier of the record.
        id: EntityId,
    },
    /// Bulk-add imported contacts, skipping exact email duplicates.
    ImportContacts(Vec<Contact>),
    /// Replace the whole state (hydration). Produces no changes.
    LoadState(AppState),
}

impl Action {
    /// Stable action name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddEvent(_) => "ADD_EVENT",
            Action::UpdateEvent(_) => "UPDATE_EVENT",
            Action::DeleteEvent(_) => "DELETE_EVENT",
            Action::AddBirthday(_) => "ADD_BIRTHDAY",
            Action::UpdateBirthday(_) => "UPDATE_BIRTHDAY",
            Action::DeleteBirthday(_) => "DELETE_BIRTHDAY",
            Action::AddTask(_) => "ADD_TASK",
            Action::UpdateTask(_) => "UPDATE_TASK",
            Action::DeleteTask(_) => "DELETE_TASK",
            Action::AddContact(_) => "ADD_CONTACT",
            Action::UpdateContact(_) => "UPDATE_CONTACT",
            Action::DeleteContact(_) => "DELETE_CONTACT",
            Action::AddArticle(_) => "ADD_ARTICLE",
            Action::UpdateArticle(_) => "UPDATE_ARTICLE",
            Action::DeleteArticle(_) => "DELETE_ARTICLE",
            Action::ToggleFavorite { .. } => "TOGGLE_FAVORITE",
            Action::ImportContacts(_) => "IMPORT_CONTACTS",
            Action::LoadState(_) => "LOAD_STATE",
        }
    }
}

/// One record-level effect of an action.
///
/// For creates and updates `entity` is the new record; for deletes it is the
/// record as it was just before removal.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Remote operation implied by the change.
    pub operation: SyncOperation,
    /// The affected record.
    pub entity: Entity,
}

impl Change {
    fn new<R: Record>(operation: SyncOperation, record: R) -> Self {
        Self {
            operation,
            entity: record.into_entity(),
        }
    }

    /// Kind of the affected record.
    pub fn kind(&self) -> EntityKind {
        self.entity.kind()
    }

    /// Identifier of the affected record.
    pub fn id(&self) -> &EntityId {
        self.entity.id()
    }

    /// Build the sync queue entry for this change.
    pub fn to_queue_item(&self) -> Result<NewSyncQueueItem, serde_json::Error> {
        Ok(NewSyncQueueItem::new(
            self.operation,
            self.kind(),
            self.entity.to_payload()?,
        ))
    }
}

impl AppState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an action and return the new state plus the changes to persist.
    ///
    /// This is a pure function - no side effects. Actions that do not alter
    /// any record (duplicate add, update or delete of an unknown id) return
    /// the state unchanged and no changes.
    pub fn apply(mut self, action: Action) -> (Self, Vec<Change>) {
        let mut changes = Vec::new();

        match action {
            Action::AddEvent(r) => add(&mut self.events, r, &mut changes),
            Action::UpdateEvent(r) => update(&mut self.events, r, &mut changes),
            Action::DeleteEvent(id) => delete(&mut self.events, &id, &mut changes),
            Action::AddBirthday(r) => add(&mut self.birthdays, r, &mut changes),
            Action::UpdateBirthday(r) => update(&mut self.birthdays, r, &mut changes),
            Action::DeleteBirthday(id) => delete(&mut self.birthdays, &id, &mut changes),
            Action::AddTask(r) => add(&mut self.tasks, r, &mut changes),
            Action::UpdateTask(r) => update(&mut self.tasks, r, &mut changes),
            Action::DeleteTask(id) => delete(&mut self.tasks, &id, &mut changes),
            Action::AddContact(r) => add(&mut self.contacts, r, &mut changes),
            Action::UpdateContact(r) => update(&mut self.contacts, r, &mut changes),
            Action::DeleteContact(id) => delete(&mut self.contacts, &id, &mut changes),
            Action::AddArticle(r) => add(&mut self.articles, r, &mut changes),
            Action::UpdateArticle(r) => update(&mut self.articles, r, &mut changes),
            Action::DeleteArticle(id) => delete(&mut self.articles, &id, &mut changes),
            Action::ToggleFavorite { kind, id } => match kind {
                EntityKind::Event => toggle_favorite(&mut self.events, &id, &mut changes),
                EntityKind::Birthday => toggle_favorite(&mut self.birthdays, &id, &mut changes),
                EntityKind::Task => toggle_favorite(&mut self.tasks, &id, &mut changes),
                EntityKind::Contact => toggle_favorite(&mut self.contacts, &id, &mut changes),
                EntityKind::Article => toggle_favorite(&mut self.articles, &id, &mut changes),
            },
            Action::ImportContacts(incoming) => {
                let merge = merge_contacts(&self.contacts, incoming);
                for contact in merge.added {
                    add(&mut self.contacts, contact, &mut changes);
                }
            }
            Action::LoadState(state) => return (state, changes),
        }

        (self, changes)
    }

    /// Look up a record by kind and id.
    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<Entity> {
        fn find<R: Record>(list: &[R], id: &EntityId) -> Option<Entity> {
            list.iter()
                .find(|r| r.id() == id)
                .cloned()
                .map(Record::into_entity)
        }

        match kind {
            EntityKind::Event => find(&self.events, id),
            EntityKind::Birthday => find(&self.birthdays, id),
            EntityKind::Task => find(&self.tasks, id),
            EntityKind::Contact => find(&self.contacts, id),
            EntityKind::Article => find(&self.articles, id),
        }
    }

    /// All records of one kind, in insertion order.
    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        fn wrap<R: Record>(list: &[R]) -> Vec<Entity> {
            list.iter().cloned().map(Record::into_entity).collect()
        }

        match kind {
            EntityKind::Event => wrap(&self.events),
            EntityKind::Birthday => wrap(&self.birthdays),
            EntityKind::Task => wrap(&self.tasks),
            EntityKind::Contact => wrap(&self.contacts),
            EntityKind::Article => wrap(&self.articles),
        }
    }

    /// Every record of every kind.
    pub fn all_entities(&self) -> Vec<Entity> {
        EntityKind::ALL
            .iter()
            .flat_map(|kind| self.entities(*kind))
            .collect()
    }

    /// Number of records of one kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Event => self.events.len(),
            EntityKind::Birthday => self.birthdays.len(),
            EntityKind::Task => self.tasks.len(),
            EntityKind::Contact => self.contacts.len(),
            EntityKind::Article => self.articles.len(),
        }
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        EntityKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    /// Check if the state holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn add<R: Record>(list: &mut Vec<R>, record: R, changes: &mut Vec<Change>) {
    if list.iter().any(|r| r.id() == record.id()) {
        return;
    }
    list.push(record.clone());
    changes.push(Change::new(SyncOperation::Create, record));
}

fn update<R: Record>(list: &mut [R], record: R, changes: &mut Vec<Change>) {
    if let Some(slot) = list.iter_mut().find(|r| r.id() == record.id()) {
        *slot = record.clone();
        changes.push(Change::new(SyncOperation::Update, record));
    }
}

fn delete<R: Record>(list: &mut Vec<R>, id: &EntityId, changes: &mut Vec<Change>) {
    if let Some(pos) = list.iter().position(|r| r.id() == id) {
        let removed = list.remove(pos);
        changes.push(Change::new(SyncOperation::Delete, removed));
    }
}

fn toggle_favorite<R: Record>(list: &mut [R], id: &EntityId, changes: &mut Vec<Change>) {
    if let Some(slot) = list.iter_mut().find(|r| r.id() == id) {
        let favorite = !slot.is_favorite();
        slot.set_favorite(favorite);
        changes.push(Change::new(SyncOperation::Update, slot.clone()));
    }
}

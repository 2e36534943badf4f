//! Add, list, favorite, delete and import records.

use anyhow::{Context, Result};
use cultura_sync_core::Action;
use cultura_sync_types::{Contact, Entity, EntityId, EntityKind};
use serde::Deserialize;
use std::path::Path;

use super::print_entities;
use crate::config::Workspace;

/// Run the add command.
pub async fn add(data_dir: &Path, entity: Entity) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let container = workspace.container().await?;

    let kind = entity.kind();
    let id = entity.id().clone();
    let action = match entity {
        Entity::Event(r) => Action::AddEvent(r),
        Entity::Birthday(r) => Action::AddBirthday(r),
        Entity::Task(r) => Action::AddTask(r),
        Entity::Contact(r) => Action::AddContact(r),
        Entity::Article(r) => Action::AddArticle(r),
    };
    container.dispatch(action).await?;

    println!("Added {} {}", kind, id);
    Ok(())
}

/// Run the list command.
pub async fn list(data_dir: &Path, kind: Option<EntityKind>, favorites: bool) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let container = workspace.container().await?;

    let state = container.state().await;
    let entities: Vec<Entity> = match kind {
        Some(kind) => state.entities(kind),
        None => state.all_entities(),
    }
    .into_iter()
    .filter(|e| !favorites || e.is_favorite())
    .collect();

    print_entities(&entities);
    Ok(())
}

/// Run the favorite command (toggles the flag).
pub async fn favorite(data_dir: &Path, kind: EntityKind, id: &str) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let container = workspace.container().await?;

    let changes = container
        .dispatch(Action::ToggleFavorite {
            kind,
            id: EntityId::from_string(id),
        })
        .await?;

    match changes.first() {
        Some(change) if change.entity.is_favorite() => {
            println!("Marked {} {} as favorite", kind, id)
        }
        Some(_) => println!("Removed {} {} from favorites", kind, id),
        None => anyhow::bail!("No {} with id {}", kind, id),
    }
    Ok(())
}

/// Run the delete command.
pub async fn delete(data_dir: &Path, kind: EntityKind, id: &str) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let container = workspace.container().await?;

    let id = EntityId::from_string(id);
    let action = match kind {
        EntityKind::Event => Action::DeleteEvent(id.clone()),
        EntityKind::Birthday => Action::DeleteBirthday(id.clone()),
        EntityKind::Task => Action::DeleteTask(id.clone()),
        EntityKind::Contact => Action::DeleteContact(id.clone()),
        EntityKind::Article => Action::DeleteArticle(id.clone()),
    };

    if container.dispatch(action).await?.is_empty() {
        anyhow::bail!("No {} with id {}", kind, id);
    }
    println!("Deleted {} {}", kind, id);
    Ok(())
}

/// A contact as found in an import file. Ids are assigned on import.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedContact {
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<ImportedContact> for Contact {
    fn from(imported: ImportedContact) -> Self {
        let mut contact = Contact::new(imported.name);
        contact.email = imported.email.filter(|e| !e.trim().is_empty());
        contact.phone = imported.phone;
        contact.organization = imported.organization;
        contact.notes = imported.notes;
        contact
    }
}

/// Run the import command on a JSON array of contacts.
pub async fn import(data_dir: &Path, file: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let imported: Vec<ImportedContact> =
        serde_json::from_str(&contents).context("Import file must be a JSON array of contacts")?;
    let total = imported.len();

    let workspace = Workspace::open(data_dir).await?;
    let container = workspace.container().await?;
    let changes = container
        .dispatch(Action::ImportContacts(
            imported.into_iter().map(Contact::from).collect(),
        ))
        .await?;

    println!(
        "Imported {} of {} contacts ({} duplicates skipped)",
        changes.len(),
        total,
        total - changes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cultura_sync_client::LocalStore;
    use cultura_sync_types::{Collection, Event};
    use tempfile::tempdir;

    async fn state_of(data_dir: &Path) -> cultura_sync_core::AppState {
        let workspace = Workspace::open(data_dir).await.unwrap();
        workspace.container().await.unwrap().state().await
    }

    #[tokio::test]
    async fn add_then_delete_event() {
        let dir = tempdir().unwrap();
        let event = Event::new("Feria", Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let id = event.id.to_string();

        add(dir.path(), Entity::Event(event)).await.unwrap();
        assert_eq!(state_of(dir.path()).await.events.len(), 1);

        delete(dir.path(), EntityKind::Event, &id).await.unwrap();
        assert!(state_of(dir.path()).await.events.is_empty());

        // Create and delete are both queued.
        let workspace = Workspace::open(dir.path()).await.unwrap();
        assert_eq!(workspace.store.count(Collection::SyncQueue).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_unknown_id_fails() {
        let dir = tempdir().unwrap();
        assert!(delete(dir.path(), EntityKind::Task, "nope").await.is_err());
    }

    #[tokio::test]
    async fn favorite_toggles_flag() {
        let dir = tempdir().unwrap();
        let contact = Contact::new("Ana");
        let id = contact.id.to_string();
        add(dir.path(), Entity::Contact(contact)).await.unwrap();

        favorite(dir.path(), EntityKind::Contact, &id).await.unwrap();
        assert!(state_of(dir.path()).await.contacts[0].is_favorite);

        favorite(dir.path(), EntityKind::Contact, &id).await.unwrap();
        assert!(!state_of(dir.path()).await.contacts[0].is_favorite);
    }

    #[tokio::test]
    async fn import_skips_duplicates() {
        let dir = tempdir().unwrap();
        add(
            dir.path(),
            Entity::Contact(Contact::new("Ana").with_email("ana@example.org")),
        )
        .await
        .unwrap();

        let file = dir.path().join("contacts.json");
        std::fs::write(
            &file,
            r#"[
                {"name": "Ana again", "email": "ana@example.org"},
                {"name": "Luis", "email": "luis@example.org"},
                {"name": "No email"}
            ]"#,
        )
        .unwrap();

        import(dir.path(), &file).await.unwrap();
        assert_eq!(state_of(dir.path()).await.contacts.len(), 3);
    }

    #[tokio::test]
    async fn import_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("contacts.json");
        std::fs::write(&file, r#"{"name": "not an array"}"#).unwrap();

        assert!(import(dir.path(), &file).await.is_err());
    }
}

//! CLI command implementations.

pub mod init;
pub mod query;
pub mod records;
pub mod status;
pub mod sync;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cultura_sync_types::Entity;

/// Parse a date-time argument as UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM` and a bare
/// `YYYY-MM-DD` (midnight).
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    bail!("Invalid date {:?}: expected YYYY-MM-DD[THH:MM] or RFC 3339", input)
}

/// Parse a calendar date argument.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    match NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => bail!("Invalid date {:?}: expected YYYY-MM-DD", input),
    }
}

/// One line per record: kind, id, label, the record's date and a favorite marker.
pub fn format_entity(entity: &Entity) -> String {
    let when = match entity {
        Entity::Event(e) => Some(e.date.format("%Y-%m-%d %H:%M").to_string()),
        Entity::Birthday(b) => Some(b.date.format("%m-%d").to_string()),
        Entity::Task(t) => t.due_date.map(|d| d.format("%Y-%m-%d %H:%M").to_string()),
        Entity::Contact(c) => c.email.clone(),
        Entity::Article(a) => Some(a.published_at.format("%Y-%m-%d").to_string()),
    };
    let done = matches!(entity, Entity::Task(t) if t.completed);

    let mut line = format!("[{}] {}  {}", entity.kind(), entity.id(), entity.label());
    if let Some(when) = when {
        line.push_str(&format!("  ({})", when));
    }
    if done {
        line.push_str("  [done]");
    }
    if entity.is_favorite() {
        line.push_str("  *");
    }
    line
}

/// Print a list of records, or a placeholder when empty.
pub fn print_entities(entities: &[Entity]) {
    if entities.is_empty() {
        println!("(nothing)");
        return;
    }
    for entity in entities {
        println!("{}", format_entity(entity));
    }
}

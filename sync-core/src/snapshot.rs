//! Persisted snapshot schema.
//!
//! The state container writes a full snapshot of [`AppState`] after every
//! dispatched action. The on-disk layout is versioned:
//!
//! - **v2** (current): `{"schemaVersion": 2, "state": {...}}` with every date
//!   as an RFC 3339 UTC string.
//! - **v1** (legacy, unversioned): the state object itself at the top level.
//!   Dates are ISO strings that may lack a timezone (`2024-05-01T10:00`),
//!   may be date-only, or may be epoch milliseconds; ids may be numbers.
//!
//! [`decode`] migrates older layouts and reconstructs every date field as a
//! date value. A legacy record that cannot be read (an empty required date,
//! a date in an unknown format) is left out and listed in
//! [`DecodedSnapshot::skipped`] instead of failing the whole load.
//! It depends only on JSON, so it can be tested without a store.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use cultura_sync_types::EntityId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::AppState;

/// Snapshot schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Date-time fields of the legacy layout, per collection.
const LEGACY_DATETIME_FIELDS: &[(&str, &[&str])] = &[
    ("events", &["date", "endDate"]),
    ("tasks", &["dueDate"]),
    ("articles", &["publishedAt"]),
];

/// Calendar-date fields of the legacy layout, per collection.
const LEGACY_DATE_FIELDS: &[(&str, &[&str])] = &[("birthdays", &["date"])];

/// Naive date-time layouts accepted in legacy snapshots (interpreted as UTC).
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Errors raised while reading a persisted snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Not JSON, or JSON that does not match the state layout.
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level value is not an object.
    #[error("snapshot is not a JSON object")]
    NotAnObject,

    /// `schemaVersion` is present but not a non-negative integer.
    #[error("invalid snapshot schema version: {0}")]
    InvalidVersion(String),

    /// The snapshot was written by a newer build.
    #[error("snapshot schema version {found} is newer than supported {supported}")]
    UnsupportedVersion {
        /// Version found in the snapshot.
        found: u32,
        /// Latest version this build understands.
        supported: u32,
    },

    /// A legacy date field that cannot be interpreted.
    #[error("invalid date in {collection}.{field}: {value}")]
    InvalidDate {
        /// Collection holding the record.
        collection: String,
        /// Field name.
        field: String,
        /// Raw value found.
        value: String,
    },
}

/// A decoded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSnapshot {
    /// The reconstructed state.
    pub state: AppState,
    /// Schema version the snapshot was stored with.
    pub version: u32,
    /// Legacy records left out, one message per record.
    pub skipped: Vec<String>,
}

impl DecodedSnapshot {
    /// Whether the snapshot should be rewritten in the current schema.
    pub fn needs_rewrite(&self) -> bool {
        self.version < SCHEMA_VERSION
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    schema_version: u32,
    state: &'a AppState,
}

/// Serialize a state into the current snapshot layout.
pub fn encode(state: &AppState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&Envelope {
        schema_version: SCHEMA_VERSION,
        state,
    })?)
}

/// Parse a snapshot of any supported version.
pub fn decode(text: &str) -> Result<DecodedSnapshot, SnapshotError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut root) = value else {
        return Err(SnapshotError::NotAnObject);
    };

    let version = match root.get("schemaVersion") {
        None => 1,
        Some(raw) => raw
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| SnapshotError::InvalidVersion(raw.to_string()))?,
    };

    if version > SCHEMA_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version <= 1 {
        let (state, skipped) = migrate_v1(root)?;
        return Ok(DecodedSnapshot {
            state,
            version,
            skipped,
        });
    }

    let state_value = root.remove("state").unwrap_or_else(|| Value::Object(Map::new()));
    let state: AppState = serde_json::from_value(state_value)?;
    Ok(DecodedSnapshot {
        state,
        version,
        skipped: Vec::new(),
    })
}

/// Read a legacy top-level state object record by record.
fn migrate_v1(mut root: Map<String, Value>) -> Result<(AppState, Vec<String>), SnapshotError> {
    let mut skipped = Vec::new();
    let state = AppState {
        events: legacy_records(&mut root, "events", &mut skipped)?,
        birthdays: legacy_records(&mut root, "birthdays", &mut skipped)?,
        tasks: legacy_records(&mut root, "tasks", &mut skipped)?,
        contacts: legacy_records(&mut root, "contacts", &mut skipped)?,
        articles: legacy_records(&mut root, "articles", &mut skipped)?,
    };
    Ok((state, skipped))
}

/// Convert one legacy collection, dropping the records that cannot be read.
///
/// A collection that is not a list still fails the load.
fn legacy_records<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    collection: &str,
    skipped: &mut Vec<String>,
) -> Result<Vec<T>, SnapshotError> {
    let records: Vec<Value> = match root.remove(collection) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(raw) => serde_json::from_value(raw)?,
    };

    let mut kept = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match migrate_record(record, collection) {
            Ok(record) => kept.push(record),
            Err(err) => skipped.push(format!("{collection}[{index}]: {err}")),
        }
    }
    Ok(kept)
}

fn migrate_record<T: DeserializeOwned>(
    mut record: Value,
    collection: &str,
) -> Result<T, SnapshotError> {
    if let Some(fields) = record.as_object_mut() {
        normalize_id(fields, "id", true);
        normalize_id(fields, "contactId", false);

        for (_, names) in LEGACY_DATETIME_FIELDS.iter().filter(|(c, _)| *c == collection) {
            for field in *names {
                rewrite_field(fields, collection, field, |raw| {
                    parse_legacy_datetime(raw)
                        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                })?;
            }
        }
        for (_, names) in LEGACY_DATE_FIELDS.iter().filter(|(c, _)| *c == collection) {
            for field in *names {
                rewrite_field(fields, collection, field, |raw| {
                    parse_legacy_date(raw).map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                })?;
            }
        }
    }
    Ok(serde_json::from_value(record)?)
}

/// Numbers become strings; a missing required id gets a fresh one.
fn normalize_id(record: &mut Map<String, Value>, field: &str, required: bool) {
    match record.get(field) {
        Some(Value::Number(n)) => {
            let id = n.to_string();
            record.insert(field.to_string(), Value::String(id));
        }
        Some(Value::String(_)) => {}
        Some(Value::Null) | None if required => {
            record.insert(field.to_string(), Value::String(EntityId::new().to_string()));
        }
        _ => {}
    }
}

fn rewrite_field(
    record: &mut Map<String, Value>,
    collection: &str,
    field: &str,
    convert: impl Fn(&Value) -> Option<Value>,
) -> Result<(), SnapshotError> {
    let Some(raw) = record.get(field) else {
        return Ok(());
    };
    if raw.is_null() || raw.as_str().is_some_and(|s| s.trim().is_empty()) {
        record.insert(field.to_string(), Value::Null);
        return Ok(());
    }

    let converted = convert(raw).ok_or_else(|| SnapshotError::InvalidDate {
        collection: collection.to_string(),
        field: field.to_string(),
        value: raw.to_string(),
    })?;
    record.insert(field.to_string(), converted);
    Ok(())
}

/// Interpret a legacy date-time value as a UTC instant.
fn parse_legacy_datetime(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in NAIVE_DATETIME_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Interpret a legacy date value as a calendar date.
fn parse_legacy_date(raw: &Value) -> Option<NaiveDate> {
    if let Some(s) = raw.as_str() {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    parse_legacy_datetime(raw).map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Action;
    use chrono::TimeZone;
    use cultura_sync_types::{Birthday, Contact, Event, Task};
    use serde_json::json;

    fn sample_state() -> AppState {
        let mut event = Event::new("Feria", Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        event.end_date = Some(Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap());
        let birthday = Birthday::new("Lola", NaiveDate::from_ymd_opt(1990, 3, 15).unwrap());
        let mut task = Task::new("Print tickets");
        task.due_date = Some(Utc.with_ymd_and_hms(2024, 4, 30, 18, 0, 0).unwrap());

        AppState::new()
            .apply(Action::AddEvent(event))
            .0
            .apply(Action::AddBirthday(birthday))
            .0
            .apply(Action::AddTask(task))
            .0
            .apply(Action::AddContact(Contact::new("Ana").with_email("ana@example.org")))
            .0
    }

    #[test]
    fn encode_then_decode_is_lossless() {
        let state = sample_state();
        let text = encode(&state).unwrap();

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.state, state);
        assert_eq!(decoded.version, SCHEMA_VERSION);
        assert!(!decoded.needs_rewrite());
    }

    #[test]
    fn encoded_snapshot_is_versioned() {
        let text = encode(&AppState::new()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["schemaVersion"], 2);
        assert!(value["state"]["events"].is_array());
    }

    #[test]
    fn legacy_naive_datetime_is_read_as_utc() {
        let legacy = json!({
            "events": [{
                "id": "1714557600000",
                "title": "Feria",
                "date": "2024-05-01T10:00",
                "isFavorite": true
            }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        let event = &decoded.state.events[0];

        assert_eq!(decoded.version, 1);
        assert!(decoded.needs_rewrite());
        assert_eq!(event.date, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert!(event.is_favorite);
    }

    #[test]
    fn legacy_iso_with_offset_is_converted() {
        let legacy = json!({
            "events": [{ "id": "e", "title": "t", "date": "2024-05-01T12:00:00.000+02:00" }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert_eq!(
            decoded.state.events[0].date,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn legacy_numeric_ids_and_epoch_dates() {
        let legacy = json!({
            "tasks": [{ "id": 42, "title": "t", "dueDate": 1714557600000i64 }],
            "birthdays": [{ "id": 7, "name": "Lola", "date": "1990-03-15T00:00:00.000Z", "contactId": 3 }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        let task = &decoded.state.tasks[0];
        let birthday = &decoded.state.birthdays[0];

        assert_eq!(task.id.as_str(), "42");
        assert_eq!(task.due_date, DateTime::from_timestamp_millis(1714557600000));
        assert_eq!(birthday.id.as_str(), "7");
        assert_eq!(birthday.date, NaiveDate::from_ymd_opt(1990, 3, 15).unwrap());
        assert_eq!(birthday.contact_id.as_ref().map(|id| id.as_str()), Some("3"));
    }

    #[test]
    fn legacy_empty_optional_date_becomes_none() {
        let legacy = json!({
            "tasks": [{ "id": "t", "title": "t", "dueDate": "" }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert_eq!(decoded.state.tasks[0].due_date, None);
    }

    #[test]
    fn legacy_record_without_id_gets_one() {
        let legacy = json!({ "contacts": [{ "name": "Ana" }] });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert!(!decoded.state.contacts[0].id.as_str().is_empty());
    }

    #[test]
    fn legacy_invalid_date_skips_the_record() {
        let legacy = json!({
            "events": [
                { "id": "bad", "title": "t", "date": "next friday" },
                { "id": "good", "title": "t", "date": "2024-05-01" }
            ]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert_eq!(decoded.state.events.len(), 1);
        assert_eq!(decoded.state.events[0].id.as_str(), "good");
        assert_eq!(decoded.skipped.len(), 1);
        assert!(decoded.skipped[0].starts_with("events[0]"));
        assert!(decoded.skipped[0].contains("next friday"));
    }

    #[test]
    fn legacy_empty_required_date_skips_only_that_record() {
        let legacy = json!({
            "events": [
                { "id": "blank", "title": "t", "date": "" },
                { "id": "kept", "title": "t", "date": "2024-05-01T10:00" }
            ],
            "birthdays": [{ "id": "b", "name": "Lola" }],
            "articles": [{ "id": "a", "title": "t", "publishedAt": null }],
            "contacts": [{ "id": "c", "name": "Ana" }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert_eq!(decoded.state.events.len(), 1);
        assert_eq!(decoded.state.events[0].id.as_str(), "kept");
        assert!(decoded.state.birthdays.is_empty());
        assert!(decoded.state.articles.is_empty());
        assert_eq!(decoded.state.contacts.len(), 1);
        assert_eq!(decoded.skipped.len(), 3);
        assert!(decoded.needs_rewrite());
    }

    #[test]
    fn legacy_collection_that_is_not_a_list_is_rejected() {
        let legacy = json!({ "events": { "id": "e" } });
        assert!(matches!(decode(&legacy.to_string()), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn newer_version_is_rejected() {
        let text = json!({ "schemaVersion": 99, "state": {} }).to_string();
        assert!(matches!(
            decode(&text),
            Err(SnapshotError::UnsupportedVersion { found: 99, supported: 2 })
        ));
    }

    #[test]
    fn invalid_version_is_rejected() {
        let text = json!({ "schemaVersion": "two", "state": {} }).to_string();
        assert!(matches!(decode(&text), Err(SnapshotError::InvalidVersion(_))));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(decode("[1,2,3]"), Err(SnapshotError::NotAnObject)));
        assert!(matches!(decode("not json"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let text = json!({ "schemaVersion": 2, "state": { "events": [] } }).to_string();
        let decoded = decode(&text).unwrap();
        assert!(decoded.state.is_empty());
    }
}

//! Read-only views over [`AppState`]: favorites, text search and the
//! calendar (a given day, or an upcoming window).

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use cultura_sync_types::{Birthday, Entity};

use crate::state::AppState;

/// Every favorited record, grouped by kind in declaration order.
pub fn favorites(state: &AppState) -> Vec<Entity> {
    state
        .all_entities()
        .into_iter()
        .filter(Entity::is_favorite)
        .collect()
}

/// Case-insensitive substring search over the human-readable fields.
///
/// An empty (or whitespace-only) query matches nothing.
pub fn search(state: &AppState, text: &str) -> Vec<Entity> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    state
        .all_entities()
        .into_iter()
        .filter(|entity| searchable_fields(entity).any(|f| f.to_lowercase().contains(&needle)))
        .collect()
}

fn searchable_fields(entity: &Entity) -> Box<dyn Iterator<Item = &str> + '_> {
    match entity {
        Entity::Event(e) => Box::new(
            [
                e.title.as_str(),
                e.description.as_str(),
                e.location.as_str(),
                e.category.as_str(),
            ]
            .into_iter(),
        ),
        Entity::Birthday(b) => {
            Box::new(std::iter::once(b.name.as_str()).chain(b.notes.as_deref()))
        }
        Entity::Task(t) => Box::new([t.title.as_str(), t.description.as_str()].into_iter()),
        Entity::Contact(c) => Box::new(
            std::iter::once(c.name.as_str())
                .chain(c.email.as_deref())
                .chain(c.organization.as_deref())
                .chain(c.notes.as_deref()),
        ),
        Entity::Article(a) => Box::new(
            [a.title.as_str(), a.outlet.as_str()]
                .into_iter()
                .chain(a.summary.as_deref()),
        ),
    }
}

/// Everything that lands on `day` (UTC):
///
/// - events whose `[date, endDate]` span covers the day,
/// - tasks due that day,
/// - birthdays whose anniversary falls on the day,
/// - articles published that day.
pub fn on_day(state: &AppState, day: NaiveDate) -> Vec<Entity> {
    let mut out = Vec::new();

    out.extend(
        state
            .events
            .iter()
            .filter(|e| {
                let start = e.date.date_naive();
                let end = e.end_date.map(|d| d.date_naive()).unwrap_or(start).max(start);
                start <= day && day <= end
            })
            .cloned()
            .map(Entity::Event),
    );
    out.extend(
        state
            .birthdays
            .iter()
            .filter(|b| anniversary(b, day.year()) == Some(day))
            .cloned()
            .map(Entity::Birthday),
    );
    out.extend(
        state
            .tasks
            .iter()
            .filter(|t| t.due_date.map(|d| d.date_naive()) == Some(day))
            .cloned()
            .map(Entity::Task),
    );
    out.extend(
        state
            .articles
            .iter()
            .filter(|a| a.published_at.date_naive() == day)
            .cloned()
            .map(Entity::Article),
    );

    out
}

/// Events, open tasks and birthdays in `[from, from + days)`, soonest first.
///
/// A window reaching past the last representable instant is clamped to it.
pub fn upcoming(state: &AppState, from: DateTime<Utc>, days: u32) -> Vec<Entity> {
    let until = TimeDelta::try_days(i64::from(days))
        .and_then(|window| from.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut dated: Vec<(DateTime<Utc>, Entity)> = Vec::new();

    for event in &state.events {
        let end = event.end_date.unwrap_or(event.date).max(event.date);
        if event.date < until && end >= from {
            dated.push((event.date.max(from), Entity::Event(event.clone())));
        }
    }

    for task in state.tasks.iter().filter(|t| !t.completed) {
        if let Some(due) = task.due_date.filter(|d| *d >= from && *d < until) {
            dated.push((due, Entity::Task(task.clone())));
        }
    }

    let today = from.date_naive();
    for birthday in &state.birthdays {
        let next = anniversary(birthday, today.year())
            .filter(|d| *d >= today)
            .or_else(|| anniversary(birthday, today.year() + 1));
        if let Some(at) = next
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .filter(|at| *at < until)
        {
            dated.push((at.max(from), Entity::Birthday(birthday.clone())));
        }
    }

    dated.sort_by_key(|(at, _)| *at);
    dated.into_iter().map(|(_, entity)| entity).collect()
}

/// The birthday's anniversary in `year`; Feb 29 falls on Feb 28 in common years.
fn anniversary(birthday: &Birthday, year: i32) -> Option<NaiveDate> {
    let (month, day) = (birthday.date.month(), birthday.date.day());
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        (month == 2 && day == 29)
            .then(|| NaiveDate::from_ymd_opt(year, 2, 28))
            .flatten()
    })
}

//! SQLite storage backend.

use super::{LocalStore, RecordWrite, StateWrite, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use cultura_sync_types::{Collection, DeadLetter, NewSyncQueueItem, QueueItemId, SyncQueueItem};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Schema migrations, applied in order and tracked with `PRAGMA user_version`.
const MIGRATIONS: &[&[&str]] = &[
    &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        UNIQUE(collection, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        operation TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        data TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        retries INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp, seq)",
    r#"
    CREATE TABLE IF NOT EXISTS dead_letters (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        operation TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        data TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        retries INTEGER NOT NULL,
        reason TEXT NOT NULL,
        buried_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS snapshot (
        slot INTEGER PRIMARY KEY CHECK (slot = 1),
        body TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    ],
    // v2: dead letters remember their queue position so a requeue restores it.
    &["ALTER TABLE dead_letters ADD COLUMN queue_seq INTEGER NOT NULL DEFAULT 0"],
];

/// SQLite-based local store.
///
/// Uses WAL mode with `synchronous = FULL`, so a write is on disk once the
/// call returns.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        tracing::info!("Opened local store at {}", path.display());

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .synchronous(SqliteSynchronous::Full);

        // A single connection that never expires: every connection to
        // `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let current = self.schema_version().await?;
        let latest = MIGRATIONS.len() as i64;

        if current > latest {
            return Err(StoreError::Migration(format!(
                "database schema v{} is newer than supported v{}",
                current, latest
            )));
        }

        for (index, statements) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }

            let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;
            for sql in *statements {
                sqlx::query(sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::Database)?;
            }
            let pragma = format!("PRAGMA user_version = {}", version);
            sqlx::query(&pragma)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Database)?;
            tx.commit().await.map_err(StoreError::Database)?;

            tracing::info!("Applied store migration v{}", version);
        }

        Ok(())
    }

    /// Current time at the precision the store keeps (milliseconds).
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

async fn upsert_record(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &str,
    data: &str,
) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::MissingId {
            collection: collection.name().to_string(),
        });
    }

    sqlx::query(
        r#"
        INSERT INTO records (collection, id, data)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data
        "#,
    )
    .bind(collection.name())
    .bind(id)
    .bind(data)
    .execute(conn)
    .await
    .map_err(StoreError::Database)?;

    Ok(())
}

async fn delete_record(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &str,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM records WHERE collection = ?1 AND id = ?2")
        .bind(collection.name())
        .bind(id)
        .execute(conn)
        .await
        .map_err(StoreError::Database)?;

    Ok(())
}

/// Insert or overwrite a queue item (matched by its id). Returns its enqueue order.
async fn upsert_queue_item(conn: &mut SqliteConnection, item: &SyncQueueItem) -> StoreResult<u64> {
    let data = serde_json::to_string(&item.data)?;

    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_queue (id, operation, entity_type, data, timestamp, retries)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            operation = excluded.operation,
            entity_type = excluded.entity_type,
            data = excluded.data,
            timestamp = excluded.timestamp,
            retries = excluded.retries
        RETURNING seq
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.operation.as_str())
    .bind(item.entity_type.as_str())
    .bind(data)
    .bind(item.timestamp.timestamp_millis())
    .bind(i64::from(item.retries))
    .fetch_one(conn)
    .await
    .map_err(StoreError::Database)?;

    Ok(u64::try_from(seq).unwrap_or_default())
}

async fn insert_dead_letter(conn: &mut SqliteConnection, letter: &DeadLetter) -> StoreResult<()> {
    let item = &letter.item;
    let data = serde_json::to_string(&item.data)?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO dead_letters
            (id, operation, entity_type, data, timestamp, retries, reason, buried_at, queue_seq)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.operation.as_str())
    .bind(item.entity_type.as_str())
    .bind(data)
    .bind(item.timestamp.timestamp_millis())
    .bind(i64::from(item.retries))
    .bind(&letter.reason)
    .bind(letter.buried_at.timestamp_millis())
    .bind(i64::try_from(item.seq).unwrap_or(0))
    .execute(conn)
    .await
    .map_err(StoreError::Database)?;

    Ok(())
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        record: &serde_json::Value,
    ) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;

        match collection {
            Collection::SyncQueue => {
                let item: SyncQueueItem = serde_json::from_value(record.clone())?;
                upsert_queue_item(&mut conn, &item).await.map(|_| ())
            }
            Collection::DeadLetters => {
                let letter: DeadLetter = serde_json::from_value(record.clone())?;
                insert_dead_letter(&mut conn, &letter).await
            }
            _ => {
                let data = serde_json::to_string(record)?;
                upsert_record(&mut conn, collection, id, &data).await
            }
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;

        let table = match collection {
            Collection::SyncQueue => "sync_queue",
            Collection::DeadLetters => "dead_letters",
            _ => return delete_record(&mut conn, collection, id).await,
        };

        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn all(&self, collection: Collection) -> StoreResult<Vec<serde_json::Value>> {
        match collection {
            Collection::SyncQueue => Ok(self
                .queue()
                .await?
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?),
            Collection::DeadLetters => Ok(self
                .dead_letters()
                .await?
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?),
            _ => {
                let rows: Vec<String> = sqlx::query_scalar(
                    "SELECT data FROM records WHERE collection = ?1 ORDER BY seq ASC",
                )
                .bind(collection.name())
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::Database)?;

                rows.iter()
                    .map(|data| serde_json::from_str(data).map_err(StoreError::from))
                    .collect()
            }
        }
    }

    async fn count(&self, collection: Collection) -> StoreResult<u64> {
        let count: i64 = match collection {
            Collection::SyncQueue => sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::Database)?,
            Collection::DeadLetters => sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::Database)?,
            _ => sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?1")
                .bind(collection.name())
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::Database)?,
        };

        Ok(count as u64)
    }

    async fn enqueue(&self, item: NewSyncQueueItem) -> StoreResult<SyncQueueItem> {
        let mut item = SyncQueueItem::from_new(item, Self::now());

        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        item.seq = upsert_queue_item(&mut conn, &item).await?;

        tracing::debug!(
            "Enqueued {} {} ({})",
            item.operation,
            item.entity_type,
            item.id
        );
        Ok(item)
    }

    async fn queue(&self) -> StoreResult<Vec<SyncQueueItem>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT id, operation, entity_type, data, timestamp, retries, seq
            FROM sync_queue
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn reschedule(&self, item: &SyncQueueItem) -> StoreResult<()> {
        sqlx::query("UPDATE sync_queue SET timestamp = ?1, retries = ?2 WHERE id = ?3")
            .bind(item.timestamp.timestamp_millis())
            .bind(i64::from(item.retries))
            .bind(item.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn dequeue(&self, id: QueueItemId) -> StoreResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn bury(&self, item: &SyncQueueItem, reason: &str) -> StoreResult<()> {
        let letter = DeadLetter {
            item: item.clone(),
            reason: reason.to_string(),
            buried_at: Self::now(),
        };

        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;
        insert_dead_letter(&mut *tx, &letter).await?;
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(item.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;
        tx.commit().await.map_err(StoreError::Database)?;

        tracing::warn!(
            "Dead-lettered {} {} ({}): {}",
            item.operation,
            item.entity_type,
            item.id,
            reason
        );
        Ok(())
    }

    async fn dead_letters(&self) -> StoreResult<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, operation, entity_type, data, timestamp, retries, reason, buried_at, queue_seq
            FROM dead_letters
            ORDER BY buried_at ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn purge_dead_letters(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM dead_letters")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(result.rows_affected())
    }

    async fn requeue_dead_letters(&self) -> StoreResult<u64> {
        let now = Self::now().timestamp_millis();

        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_queue
                (seq, id, operation, entity_type, data, timestamp, retries)
            SELECT NULLIF(queue_seq, 0), id, operation, entity_type, data, ?1, 0
            FROM dead_letters
            ORDER BY buried_at ASC, seq ASC
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("DELETE FROM dead_letters")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;
        tx.commit().await.map_err(StoreError::Database)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            tracing::info!("Requeued {} dead letters", requeued);
        }
        Ok(requeued)
    }

    async fn commit(&self, write: StateWrite) -> StoreResult<()> {
        let now = Self::now();

        // Serialize up front so a bad payload never leaves an open transaction.
        let mut records = Vec::with_capacity(write.records.len());
        for record in &write.records {
            records.push(match record {
                RecordWrite::Put(entity) => (
                    entity.kind().collection(),
                    entity.id().to_string(),
                    Some(serde_json::to_string(&entity.to_payload()?)?),
                ),
                RecordWrite::Delete(kind, id) => (kind.collection(), id.to_string(), None),
            });
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO snapshot (slot, body, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(slot) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(&write.snapshot)
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        if write.replace_all {
            sqlx::query("DELETE FROM records")
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Database)?;
        }

        for (collection, id, data) in &records {
            match data {
                Some(data) => upsert_record(&mut *tx, *collection, id, data).await?,
                None => delete_record(&mut *tx, *collection, id).await?,
            }
        }

        for item in write.enqueue {
            upsert_queue_item(&mut *tx, &SyncQueueItem::from_new(item, now)).await?;
        }

        tx.commit().await.map_err(StoreError::Database)?;
        Ok(())
    }

    async fn read_snapshot(&self) -> StoreResult<Option<String>> {
        sqlx::query_scalar("SELECT body FROM snapshot WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)
    }
}

/// Internal row type for the sync queue.
#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    operation: String,
    entity_type: String,
    data: String,
    timestamp: i64,
    retries: i64,
    seq: i64,
}

impl TryFrom<QueueRow> for SyncQueueItem {
    type Error = StoreError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            collection: Collection::SyncQueue.name().to_string(),
            reason,
        };

        Ok(SyncQueueItem {
            id: QueueItemId::parse(&row.id)
                .ok_or_else(|| corrupt(format!("invalid queue item id {}", row.id)))?,
            operation: row.operation.parse()?,
            entity_type: row.entity_type.parse()?,
            data: serde_json::from_str(&row.data)?,
            timestamp: DateTime::from_timestamp_millis(row.timestamp)
                .ok_or_else(|| corrupt(format!("invalid timestamp {}", row.timestamp)))?,
            retries: u32::try_from(row.retries)
                .map_err(|_| corrupt(format!("invalid retry count {}", row.retries)))?,
            seq: u64::try_from(row.seq)
                .map_err(|_| corrupt(format!("invalid queue position {}", row.seq)))?,
        })
    }
}

/// Internal row type for the dead-letter collection.
#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    id: String,
    operation: String,
    entity_type: String,
    data: String,
    timestamp: i64,
    retries: i64,
    reason: String,
    buried_at: i64,
    queue_seq: i64,
}

impl TryFrom<DeadLetterRow> for DeadLetter {
    type Error = StoreError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let buried_at =
            DateTime::from_timestamp_millis(row.buried_at).ok_or_else(|| StoreError::Corrupt {
                collection: Collection::DeadLetters.name().to_string(),
                reason: format!("invalid burial time {}", row.buried_at),
            })?;

        let item = QueueRow {
            id: row.id,
            operation: row.operation,
            entity_type: row.entity_type,
            data: row.data,
            timestamp: row.timestamp,
            retries: row.retries,
            seq: row.queue_seq,
        }
        .try_into()?;

        Ok(DeadLetter {
            item,
            reason: row.reason,
            buried_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use cultura_sync_types::{Entity, EntityKind, SyncOperation, Task};
    use serde_json::json;

    fn create_item(title: &str) -> NewSyncQueueItem {
        NewSyncQueueItem::new(
            SyncOperation::Create,
            EntityKind::Task,
            json!({ "id": title, "title": title }),
        )
    }

    #[tokio::test]
    async fn migrations_set_schema_version() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn put_is_an_idempotent_upsert() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .put(Collection::Events, "e1", &json!({ "id": "e1", "title": "Feria" }))
            .await
            .unwrap();
        store
            .put(Collection::Events, "e2", &json!({ "id": "e2", "title": "Concierto" }))
            .await
            .unwrap();
        store
            .put(Collection::Events, "e1", &json!({ "id": "e1", "title": "Feria de Abril" }))
            .await
            .unwrap();

        let events = store.all(Collection::Events).await.unwrap();
        assert_eq!(events.len(), 2);
        // Overwrite keeps the original insertion position.
        assert_eq!(events[0]["title"], "Feria de Abril");
        assert_eq!(events[1]["id"], "e2");
        assert_eq!(store.count(Collection::Events).await.unwrap(), 2);
        assert_eq!(store.count(Collection::Tasks).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn put_without_id_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .put(Collection::Tasks, "", &json!({ "title": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingId { .. }));
    }

    #[tokio::test]
    async fn delete_is_a_noop_when_absent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put(Collection::Contacts, "c1", &json!({ "id": "c1", "name": "Ana" }))
            .await
            .unwrap();

        store.delete(Collection::Contacts, "missing").await.unwrap();
        assert_eq!(store.count(Collection::Contacts).await.unwrap(), 1);

        store.delete(Collection::Contacts, "c1").await.unwrap();
        assert_eq!(store.count(Collection::Contacts).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enqueue_assigns_id_timestamp_and_zero_retries() {
        let store = SqliteStore::in_memory().await.unwrap();
        let before = Utc::now() - TimeDelta::milliseconds(1);

        let a = store.enqueue(create_item("a")).await.unwrap();
        let b = store.enqueue(create_item("b")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.retries, 0);
        assert!(a.timestamp >= before);

        let queue = store.queue().await.unwrap();
        assert_eq!(queue, vec![a, b]);
        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn queue_is_ordered_by_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.enqueue(create_item("first")).await.unwrap();
        let second = store.enqueue(create_item("second")).await.unwrap();

        // Push the first item behind the second one.
        let mut later = first.clone();
        later.retries = 1;
        later.timestamp = second.timestamp + TimeDelta::seconds(2);
        store.reschedule(&later).await.unwrap();

        let queue = store.queue().await.unwrap();
        assert_eq!(queue[0].id, second.id);
        assert_eq!(queue[1].id, first.id);
        assert_eq!(queue[1].retries, 1);
        assert_eq!(queue[1].timestamp, later.timestamp);

        let as_values = store.all(Collection::SyncQueue).await.unwrap();
        assert_eq!(as_values[0]["id"], json!(second.id.to_string()));
    }

    #[tokio::test]
    async fn dequeue_removes_one_item() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.enqueue(create_item("a")).await.unwrap();
        store.enqueue(create_item("b")).await.unwrap();
        store.enqueue(create_item("c")).await.unwrap();

        store.dequeue(a.id).await.unwrap();
        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn enqueue_order_survives_reschedule() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut first = store.enqueue(create_item("a")).await.unwrap();
        let second = store.enqueue(create_item("b")).await.unwrap();
        assert!(first.seq > 0);
        assert!(second.seq > first.seq);

        first.timestamp = second.timestamp + TimeDelta::minutes(5);
        first.retries = 1;
        store.reschedule(&first).await.unwrap();

        let queue = store.queue().await.unwrap();
        assert_eq!(queue[0].id, second.id);
        assert_eq!(queue[1].id, first.id);
        assert_eq!(queue[1].seq, first.seq);
    }

    #[tokio::test]
    async fn bury_moves_item_to_dead_letters() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut item = store.enqueue(create_item("a")).await.unwrap();
        item.retries = 5;

        store.bury(&item, "gave up after 5 retries").await.unwrap();

        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 0);
        let letters = store.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].item, item);
        assert_eq!(letters[0].reason, "gave up after 5 retries");
        assert_eq!(store.count(Collection::DeadLetters).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn requeue_resets_retries() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut item = store.enqueue(create_item("a")).await.unwrap();
        item.retries = 5;
        store.bury(&item, "exhausted").await.unwrap();

        assert_eq!(store.requeue_dead_letters().await.unwrap(), 1);

        let queue = store.queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, item.id);
        assert_eq!(queue[0].retries, 0);
        assert_eq!(queue[0].seq, item.seq);
        assert!(store.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_clears_dead_letters() {
        let store = SqliteStore::in_memory().await.unwrap();
        for name in ["a", "b"] {
            let item = store.enqueue(create_item(name)).await.unwrap();
            store.bury(&item, "unreplayable").await.unwrap();
        }

        assert_eq!(store.purge_dead_letters().await.unwrap(), 2);
        assert_eq!(store.count(Collection::DeadLetters).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn commit_is_applied_as_a_whole() {
        let store = SqliteStore::in_memory().await.unwrap();
        let keep = Task::new("keep");
        let gone = Task::new("gone");

        store
            .commit(StateWrite::reload(
                "v1".into(),
                vec![Entity::Task(keep.clone()), Entity::Task(gone.clone())],
            ))
            .await
            .unwrap();
        assert_eq!(store.count(Collection::Tasks).await.unwrap(), 2);
        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 0);

        store
            .commit(StateWrite {
                snapshot: "v2".into(),
                replace_all: false,
                records: vec![RecordWrite::Delete(EntityKind::Task, gone.id.clone())],
                enqueue: vec![create_item("gone")],
            })
            .await
            .unwrap();

        assert_eq!(store.read_snapshot().await.unwrap().as_deref(), Some("v2"));
        let tasks = store.all(Collection::Tasks).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], json!(keep.id.as_str()));
        assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_snapshot_is_none_on_fresh_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.read_snapshot().await.unwrap(), None);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cultura.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.enqueue(create_item("a")).await.unwrap();
            store
                .commit(StateWrite::reload("snap".into(), Vec::new()))
                .await
                .unwrap();
            store
                .put(Collection::Birthdays, "b1", &json!({ "id": "b1", "name": "Lola" }))
                .await
                .unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(reopened.count(Collection::Birthdays).await.unwrap(), 1);
        assert_eq!(reopened.count(Collection::SyncQueue).await.unwrap(), 1);
        assert_eq!(reopened.read_snapshot().await.unwrap().as_deref(), Some("snap"));
        assert_eq!(reopened.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }
}

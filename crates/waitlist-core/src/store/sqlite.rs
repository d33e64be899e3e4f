//! `SQLite` queue store using `SQLx`
//!
//! - Embedded schema executed on open (no migration files)
//! - One transaction per mutation
//! - Partial unique indexes back the "one active entry per member" and
//!   "one notified entry per equipment" invariants

use std::{path::Path, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqliteConnection, SqlitePool, Transaction,
};

use super::QueueStore;
use crate::{
    entry::{NewEntry, QueueEntry, QueueEntryRow, StatusChange},
    events::{EventType, QueueEvent, QueueEventRow},
    ids::{EntryId, EquipmentId, MemberId},
    status::EntryStatus,
    Error, Result,
};

/// Database schema as SQL string - executed once on open
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS queue_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipment_id TEXT NOT NULL,
    member_id TEXT NOT NULL,
    display_name TEXT,
    position INTEGER,
    status TEXT NOT NULL CHECK(status IN ('waiting', 'notified', 'claimed', 'expired', 'left')),
    joined_at INTEGER NOT NULL,
    notified_at INTEGER,
    expires_at INTEGER,
    closed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_queue_entries_equipment_status
    ON queue_entries(equipment_id, status);
CREATE INDEX IF NOT EXISTS idx_queue_entries_expiry
    ON queue_entries(status, expires_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_entries_one_active_per_member
    ON queue_entries(equipment_id, member_id) WHERE status IN ('waiting', 'notified');
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_entries_one_notified
    ON queue_entries(equipment_id) WHERE status = 'notified';

CREATE TABLE IF NOT EXISTS pending_handoffs (
    equipment_id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS queue_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipment_id TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    member_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    details TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_events_equipment ON queue_events(equipment_id, id);
";

macro_rules! select_entries {
    ($tail:literal) => {
        concat!(
            "SELECT id, equipment_id, member_id, display_name, position, status, joined_at, \
             notified_at, expires_at, closed_at FROM queue_entries ",
            $tail
        )
    };
}

/// Queue store backed by a `SQLite` connection pool
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 1;

    /// Connect using a `sqlite:` URL.
    ///
    /// `sqlite::memory:` URLs get a single pinned connection so the
    /// database outlives idle periods.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::open_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::database("Invalid database URL", e))?;
        Self::connect_with(options, max_connections).await
    }

    /// Open or create a database file
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        Self::connect_with(SqliteConnectOptions::new().filename(path), max_connections).await
    }

    /// Private in-memory database, mainly for tests
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::database("Invalid database URL", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::database("Failed to open in-memory database", e))?;
        Self::from_pool(pool).await
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::database("Failed to connect to database", e))?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Mutations read before they write, so take the write lock up front.
    /// A deferred transaction would fail to upgrade while another connection
    /// holds it, and `busy_timeout` does not cover that case.
    async fn begin(&self) -> Result<Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| Error::database("Failed to begin transaction", e))
    }
}

#[async_trait::async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert(&self, new: NewEntry<'_>) -> Result<QueueEntry> {
        let mut tx = self.begin().await?;

        if find_active(&mut tx, new.equipment_id, new.member_id)
            .await?
            .is_some()
        {
            return Err(Error::already_queued(new.equipment_id, new.member_id));
        }

        let position = count_active(&mut tx, new.equipment_id).await? + 1;
        let id = sqlx::query(
            "INSERT INTO queue_entries \
             (equipment_id, member_id, display_name, position, status, joined_at) \
             VALUES (?1, ?2, ?3, ?4, 'waiting', ?5)",
        )
        .bind(new.equipment_id.as_str())
        .bind(new.member_id.as_str())
        .bind(new.display_name)
        .bind(position)
        .bind(new.joined_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::already_queued(new.equipment_id, new.member_id)
            } else {
                Error::database("Failed to insert entry", e)
            }
        })?
        .last_insert_rowid();

        let entry = fetch_entry(&mut tx, id)
            .await?
            .ok_or_else(|| Error::Database("Failed to retrieve inserted entry".to_string()))?;

        insert_event(
            &mut tx,
            &QueueEvent::new(
                entry.equipment_id.clone(),
                entry.id,
                entry.member_id.clone(),
                EventType::Joined,
                new.joined_at,
            ),
        )
        .await?;

        commit(tx).await?;
        Ok(entry)
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let mut conn = self.acquire().await?;
        fetch_entry(&mut conn, id.get()).await
    }

    async fn list_active(&self, equipment_id: &EquipmentId) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query_as::<_, QueueEntryRow>(select_entries!(
            "WHERE equipment_id = ?1 AND status IN ('waiting', 'notified') \
             ORDER BY position ASC, id ASC"
        ))
        .bind(equipment_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database("Failed to list active entries", e))?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    async fn find_active_by_member(
        &self,
        equipment_id: &EquipmentId,
        member_id: &MemberId,
    ) -> Result<Option<QueueEntry>> {
        let mut conn = self.acquire().await?;
        find_active(&mut conn, equipment_id, member_id).await
    }

    async fn update_status(&self, id: EntryId, change: StatusChange) -> Result<QueueEntry> {
        let mut tx = self.begin().await?;

        let current = fetch_entry(&mut tx, id.get())
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;
        current.status.validate_transition(change.to)?;

        if change.to == EntryStatus::Notified {
            mark_notified(&mut tx, &current, change).await?;
        } else {
            close_entry(&mut tx, &current, change).await?;
        }

        insert_event(
            &mut tx,
            &QueueEvent::new(
                current.equipment_id.clone(),
                current.id,
                current.member_id.clone(),
                EventType::for_status(change.to),
                change.at,
            ),
        )
        .await?;

        let updated = fetch_entry(&mut tx, id.get())
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;

        commit(tx).await?;
        Ok(updated)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query_as::<_, QueueEntryRow>(select_entries!(
            "WHERE status = 'notified' AND expires_at < ?1 ORDER BY expires_at ASC, id ASC"
        ))
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database("Failed to list expired entries", e))?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    async fn pending_handoffs(&self) -> Result<Vec<EquipmentId>> {
        sqlx::query_scalar::<_, String>(
            "SELECT equipment_id FROM pending_handoffs ORDER BY created_at ASC, equipment_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map(|ids| ids.into_iter().map(EquipmentId::new).collect())
        .map_err(|e| Error::database("Failed to list pending hand-offs", e))
    }

    async fn clear_handoff(&self, equipment_id: &EquipmentId) -> Result<()> {
        let mut conn = self.acquire().await?;
        delete_handoff(&mut conn, equipment_id).await
    }

    async fn record_event(&self, event: &QueueEvent) -> Result<QueueEvent> {
        let mut conn = self.acquire().await?;
        let id = insert_event(&mut conn, event).await?;
        Ok(QueueEvent { id, ..event.clone() })
    }

    async fn list_events(
        &self,
        equipment_id: &EquipmentId,
        limit: u32,
    ) -> Result<Vec<QueueEvent>> {
        let rows = sqlx::query_as::<_, QueueEventRow>(
            "SELECT id, equipment_id, entry_id, member_id, event_type, details, created_at \
             FROM queue_events WHERE equipment_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(equipment_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database("Failed to list events", e))?;

        rows.into_iter().map(QueueEvent::try_from).collect()
    }
}

impl SqliteQueueStore {
    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| Error::database("Failed to acquire connection", e))
    }
}

/// Initialize database schema
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| Error::database("Failed to initialize schema", e))
}

async fn commit(tx: Transaction<'static, sqlx::Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| Error::database("Failed to commit transaction", e))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

async fn fetch_entry(conn: &mut SqliteConnection, id: i64) -> Result<Option<QueueEntry>> {
    sqlx::query_as::<_, QueueEntryRow>(select_entries!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::database("Failed to get entry", e))?
        .map(QueueEntry::try_from)
        .transpose()
}

async fn find_active(
    conn: &mut SqliteConnection,
    equipment_id: &EquipmentId,
    member_id: &MemberId,
) -> Result<Option<QueueEntry>> {
    sqlx::query_as::<_, QueueEntryRow>(select_entries!(
        "WHERE equipment_id = ?1 AND member_id = ?2 AND status IN ('waiting', 'notified')"
    ))
    .bind(equipment_id.as_str())
    .bind(member_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| Error::database("Failed to find member entry", e))?
    .map(QueueEntry::try_from)
    .transpose()
}

async fn count_active(conn: &mut SqliteConnection, equipment_id: &EquipmentId) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM queue_entries \
         WHERE equipment_id = ?1 AND status IN ('waiting', 'notified')",
    )
    .bind(equipment_id.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::database("Failed to count active entries", e))
}

async fn mark_notified(
    conn: &mut SqliteConnection,
    current: &QueueEntry,
    change: StatusChange,
) -> Result<()> {
    let expires_at = change.expires_at.ok_or_else(|| {
        Error::InvalidRequest("a notified entry needs a claim deadline".to_string())
    })?;

    sqlx::query(
        "UPDATE queue_entries SET status = 'notified', notified_at = ?1, expires_at = ?2 \
         WHERE id = ?3",
    )
    .bind(change.at.timestamp_millis())
    .bind(expires_at.timestamp_millis())
    .bind(current.id.get())
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::database("Failed to mark entry notified", e))?;

    delete_handoff(conn, &current.equipment_id).await
}

/// Move an entry to a terminal state and close the gap it leaves.
async fn close_entry(
    conn: &mut SqliteConnection,
    current: &QueueEntry,
    change: StatusChange,
) -> Result<()> {
    let at = change.at.timestamp_millis();

    sqlx::query(
        "UPDATE queue_entries SET status = ?1, position = NULL, expires_at = NULL, \
         closed_at = ?2 WHERE id = ?3",
    )
    .bind(change.to.as_str())
    .bind(at)
    .bind(current.id.get())
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::database("Failed to close entry", e))?;

    if let Some(position) = current.position {
        sqlx::query(
            "UPDATE queue_entries SET position = position - 1 \
             WHERE equipment_id = ?1 AND status IN ('waiting', 'notified') AND position > ?2",
        )
        .bind(current.equipment_id.as_str())
        .bind(i64::from(position))
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::database("Failed to recompute positions", e))?;
    }

    match (current.status, change.to) {
        (EntryStatus::Notified, EntryStatus::Left) => {
            sqlx::query(
                "INSERT INTO pending_handoffs (equipment_id, created_at) VALUES (?1, ?2) \
                 ON CONFLICT(equipment_id) DO UPDATE SET created_at = excluded.created_at",
            )
            .bind(current.equipment_id.as_str())
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::database("Failed to record hand-off", e))?;
            Ok(())
        }
        (_, EntryStatus::Claimed) => delete_handoff(conn, &current.equipment_id).await,
        _ => Ok(()),
    }
}

async fn delete_handoff(conn: &mut SqliteConnection, equipment_id: &EquipmentId) -> Result<()> {
    sqlx::query("DELETE FROM pending_handoffs WHERE equipment_id = ?1")
        .bind(equipment_id.as_str())
        .execute(&mut *conn)
        .await
        .map(|_| ())
        .map_err(|e| Error::database("Failed to clear hand-off", e))
}

async fn insert_event(conn: &mut SqliteConnection, event: &QueueEvent) -> Result<i64> {
    sqlx::query(
        "INSERT INTO queue_events \
         (equipment_id, entry_id, member_id, event_type, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(event.equipment_id.as_str())
    .bind(event.entry_id.get())
    .bind(event.member_id.as_str())
    .bind(event.event_type.as_str())
    .bind(event.details.as_deref())
    .bind(event.created_at.timestamp_millis())
    .execute(&mut *conn)
    .await
    .map(|result| result.last_insert_rowid())
    .map_err(|e| Error::database("Failed to record event", e))
}

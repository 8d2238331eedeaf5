//! SQLite-backed pinned ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{LedgerError, LedgerResult, PinLedger};
use crate::model::{ClipEntry, ClipId, ClipKind};

/// Database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file at `path` and run migrations.
    pub async fn new(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Opened pinned ledger at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> LedgerResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .journal_mode(SqliteJournalMode::Wal);

        // One connection that never expires, or the database vanishes with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct PinnedRow {
    id: i64,
    content: Vec<u8>,
    kind: String,
    captured_at: i64,
}

impl TryFrom<PinnedRow> for ClipEntry {
    type Error = LedgerError;

    fn try_from(row: PinnedRow) -> Result<Self, Self::Error> {
        let kind: ClipKind = row
            .kind
            .parse()
            .map_err(|e| LedgerError::Corrupt(format!("clip {}: {e}", row.id)))?;
        let captured_at = DateTime::<Utc>::from_timestamp_millis(row.captured_at).ok_or_else(
            || LedgerError::Corrupt(format!("clip {}: bad timestamp {}", row.id, row.captured_at)),
        )?;

        Ok(ClipEntry {
            id: row.id,
            content: row.content.into(),
            kind,
            captured_at,
            pinned: true,
        })
    }
}

fn rows_to_entries(rows: Vec<PinnedRow>) -> LedgerResult<Vec<ClipEntry>> {
    rows.into_iter().map(ClipEntry::try_from).collect()
}

/// [`PinLedger`] over a SQLite `pinned_clips` table.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Open the ledger file at `path`.
    pub async fn open(path: &Path) -> LedgerResult<Self> {
        let db = Database::new(path).await?;
        Ok(Self::new(&db))
    }

    pub async fn in_memory() -> LedgerResult<Self> {
        let db = Database::in_memory().await?;
        Ok(Self::new(&db))
    }
}

#[async_trait]
impl PinLedger for SqliteLedger {
    #[instrument(skip(self, entry), fields(id = entry.id))]
    async fn put(&self, entry: &ClipEntry) -> LedgerResult<()> {
        debug!("Persisting pinned clip {}", entry.id);

        sqlx::query(
            r#"
            INSERT INTO pinned_clips (id, content, kind, captured_at, pinned_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                kind = excluded.kind,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.content.as_ref())
        .bind(entry.kind.as_str())
        .bind(entry.captured_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: ClipId) -> LedgerResult<Option<ClipEntry>> {
        let row = sqlx::query_as::<_, PinnedRow>(
            "SELECT id, content, kind, captured_at FROM pinned_clips WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ClipEntry::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> LedgerResult<Vec<ClipEntry>> {
        let rows = sqlx::query_as::<_, PinnedRow>(
            r#"
            SELECT id, content, kind, captured_at
            FROM pinned_clips
            ORDER BY captured_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows_to_entries(rows)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ClipId) -> LedgerResult<bool> {
        let result = sqlx::query("DELETE FROM pinned_clips WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            debug!("Removed pinned clip {}", id);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> LedgerResult<u64> {
        let result = sqlx::query("DELETE FROM pinned_clips")
            .execute(&self.pool)
            .await?;

        debug!("Cleared {} pinned clips", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn count(&self) -> LedgerResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pinned_clips")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, content), fields(len = content.len()))]
    async fn find_by_content(
        &self,
        content: &[u8],
        kind: ClipKind,
    ) -> LedgerResult<Option<ClipEntry>> {
        let row = sqlx::query_as::<_, PinnedRow>(
            r#"
            SELECT id, content, kind, captured_at
            FROM pinned_clips
            WHERE kind = ? AND content = ?
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ClipEntry::try_from).transpose()
    }

    async fn max_id(&self) -> LedgerResult<Option<ClipId>> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM pinned_clips")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Pinned ledger closed");
    }
}

// src/dedup.rs
//
// Durable "already notified" ledger shared by every worker of every task.
// One row per (source, listing_id), first writer wins: `record` is an
// atomic test-and-set via INSERT OR IGNORE, so two workers racing on the
// same identifier can never both treat it as new.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::listing::SourceKind;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS seen (
    source      TEXT    NOT NULL,
    listing_id  TEXT    NOT NULL,
    first_seen  INTEGER NOT NULL,
    PRIMARY KEY (source, listing_id)
)
"#;

#[derive(Clone)]
pub struct DedupStore {
    pool: SqlitePool,
}

impl DedupStore {
    /// Open (creating if missing) the ledger at `path`. WAL mode so worker
    /// reads do not stall each other behind the single writer.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool).await
    }

    /// Non-durable store for tests.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Cheap connectivity probe used at task setup.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool; every query after this fails. Used at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn contains(&self, source: SourceKind, id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM seen WHERE source = ? AND listing_id = ?")
                .bind(source.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Commit dedup membership. Returns true iff this caller inserted the
    /// row; a false return means some other worker got there first and the
    /// caller must treat the listing as already seen.
    pub async fn record(&self, source: SourceKind, id: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO seen (source, listing_id, first_seen) VALUES (?, ?, ?)",
        )
        .bind(source.as_str())
        .bind(id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Number of recorded identifiers (diagnostics only).
    pub async fn len(&self) -> Result<u64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    /// Drop ledger rows older than `max_age_days` (maintenance hook).
    pub async fn prune_older_than(&self, max_age_days: u32) -> Result<u64, sqlx::Error> {
        let cutoff = chrono::Utc::now().timestamp() - i64::from(max_age_days) * 86_400;
        let res = sqlx::query("DELETE FROM seen WHERE first_seen < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

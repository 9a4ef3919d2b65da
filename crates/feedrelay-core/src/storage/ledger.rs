use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, Sqlite, Transaction};

use super::Database;
use crate::Result;

/// A link that has been (or was about to be) published
#[derive(Debug, Clone, FromRow)]
pub struct PostedEntryRecord {
    pub id: i64,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// Durable log of published entry links
pub struct DedupLedger<'a> {
    db: &'a Database,
}

impl<'a> DedupLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn is_posted(&self, link: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posted_entries WHERE link = ?")
            .bind(link)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 > 0)
    }

    /// Append a record, returning its id
    pub async fn record(&self, link: &str, created_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO posted_entries (link, created_at) VALUES (?, ?)")
            .bind(link)
            .bind(created_at)
            .execute(self.db.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_link(&self, link: &str) -> Result<Vec<PostedEntryRecord>> {
        let rows: Vec<PostedEntryRecord> = sqlx::query_as(
            r#"
            SELECT id, link, created_at
            FROM posted_entries
            WHERE link = ?
            ORDER BY id ASC
            "#,
        )
        .bind(link)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posted_entries")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u64)
    }

    /// Delete records strictly older than `older_than` and reclaim space
    pub async fn prune(&self, older_than: Duration) -> Result<u64> {
        self.prune_before(Utc::now() - older_than).await
    }

    /// Delete records with `created_at < cutoff`; a record exactly at the cutoff stays
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posted_entries WHERE created_at < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;

        sqlx::query("VACUUM").execute(self.db.pool()).await?;

        let deleted = result.rows_affected();
        tracing::info!(deleted, cutoff = %cutoff, "Pruned posted-entry ledger");

        Ok(deleted)
    }

    /// Open a batch covering one feed's entry loop.
    ///
    /// Nothing written through the batch is visible to other connections
    /// until `commit`; dropping it uncommitted rolls everything back.
    pub async fn begin(&self) -> Result<LedgerBatch> {
        let tx = self.db.pool().begin().await?;
        Ok(LedgerBatch { tx, recorded: 0 })
    }
}

/// One transaction spanning a feed's dedup checks and write-ahead records
pub struct LedgerBatch {
    tx: Transaction<'static, Sqlite>,
    recorded: u32,
}

impl LedgerBatch {
    pub async fn is_posted(&mut self, link: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posted_entries WHERE link = ?")
            .bind(link)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count.0 > 0)
    }

    pub async fn record(&mut self, link: &str, created_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO posted_entries (link, created_at) VALUES (?, ?)")
            .bind(link)
            .bind(created_at)
            .execute(&mut *self.tx)
            .await?;

        self.recorded += 1;
        Ok(result.last_insert_rowid())
    }

    /// Commit, returning how many records the batch wrote
    pub async fn commit(self) -> Result<u32> {
        self.tx.commit().await?;
        Ok(self.recorded)
    }
}

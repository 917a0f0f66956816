//! Durable ledger of produced transcode artifacts.
//!
//! The ledger records where each artifact lives, how big it is, and when it
//! expires. Readers never mutate rows: an expired entry is simply treated as
//! absent until the cleanup sweeper removes it together with its file.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, Sqlite, SqlitePool};
use std::ops::{Deref, DerefMut};
use tracing::{debug, instrument};

use crate::entry::{CacheEntry, NewCacheEntry};
use crate::error::{CacheError, Result};
use crate::stats::LedgerStats;

/// Persistence contract for cache entries.
#[async_trait]
pub trait CacheLedger: Send + Sync {
    /// Create the schema if it does not exist yet.
    async fn initialize(&self) -> Result<()>;

    /// Find the live entry for a fingerprint.
    ///
    /// Returns `None` when no row exists or when the row's expiry is not in
    /// the future. The expired row itself is left in place for the sweeper.
    async fn lookup(
        &self,
        media_id: &str,
        resolution: &str,
        format: &str,
        now_ms: i64,
    ) -> Result<Option<CacheEntry>>;

    /// Record a produced artifact with `expires_at = now_ms + ttl_ms`.
    ///
    /// Create-if-absent: when a live entry for the same fingerprint already
    /// exists it is returned unchanged, so two racing completion paths yield
    /// exactly one row.
    async fn insert(&self, new_entry: NewCacheEntry, now_ms: i64, ttl_ms: i64)
        -> Result<CacheEntry>;

    /// Refresh `last_accessed_at`; called on every cache hit so hot entries
    /// stay out of the LRU eviction window.
    async fn touch(&self, entry_id: i64, now_ms: i64) -> Result<()>;

    /// Refresh `last_accessed_at` and push `expires_at = now_ms + ttl_ms`.
    async fn extend(&self, entry_id: i64, now_ms: i64, ttl_ms: i64) -> Result<()>;

    /// All entries with `expires_at < now_ms`, oldest expiry first.
    async fn expired_entries(&self, now_ms: i64) -> Result<Vec<CacheEntry>>;

    /// Oldest-accessed entries whose removal brings the recorded total at or
    /// under `max_bytes`.
    ///
    /// Selection stops as soon as the remaining total satisfies the budget,
    /// so no more entries are returned than necessary. Ties on
    /// `last_accessed_at` fall back to insertion order. Empty when the total
    /// is already within budget.
    async fn entries_for_size_cleanup(&self, max_bytes: u64) -> Result<Vec<CacheEntry>>;

    /// Delete one entry row.
    async fn remove(&self, entry_id: i64) -> Result<()>;

    /// Delete several entry rows. Returns the number of rows removed.
    async fn remove_many(&self, entry_ids: &[i64]) -> Result<u64>;

    /// Delete every entry for a media id, across all resolutions and
    /// formats. Returns the number of rows removed.
    async fn remove_for_media(&self, media_id: &str) -> Result<u64>;

    /// Every entry in the ledger, in insertion order.
    async fn all_entries(&self) -> Result<Vec<CacheEntry>>;

    /// Aggregate counters, with live/expired split at `now_ms`.
    async fn stats(&self, now_ms: i64) -> Result<LedgerStats>;
}

/// SQLite-backed ledger.
pub struct SqliteCacheLedger {
    pool: SqlitePool,
}

impl SqliteCacheLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Transaction that takes SQLite's write lock at `BEGIN` time.
///
/// The insert path reads before it writes. Under a deferred `BEGIN`, two
/// connections can both finish the read and then collide upgrading to the
/// write lock, which SQLite reports as `SQLITE_BUSY` without waiting on the
/// busy timeout. `BEGIN IMMEDIATE` makes racing writers queue on the timeout
/// instead.
struct WriteTransaction {
    conn: PoolConnection<Sqlite>,
    finished: bool,
}

impl WriteTransaction {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT")
            .execute(&mut *self.conn)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;
        self.finished = true;
        Ok(())
    }
}

impl Deref for WriteTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for WriteTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        // A connection with an open transaction must not rejoin the pool.
        if !self.finished {
            self.conn.close_on_drop();
        }
    }
}

#[derive(Debug, FromRow)]
struct CacheEntryRow {
    id: i64,
    media_id: String,
    resolution: String,
    format: String,
    path: String,
    size_bytes: i64,
    duration_seconds: f64,
    created_at: i64,
    last_accessed_at: i64,
    expires_at: i64,
}

impl From<CacheEntryRow> for CacheEntry {
    fn from(row: CacheEntryRow) -> Self {
        CacheEntry {
            id: row.id,
            media_id: row.media_id,
            resolution: row.resolution,
            format: row.format,
            path: row.path,
            size_bytes: row.size_bytes.max(0) as u64,
            duration_seconds: row.duration_seconds,
            created_at: row.created_at,
            last_accessed_at: row.last_accessed_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LedgerStatsRow {
    entry_count: i64,
    live_count: i64,
    expired_count: i64,
    total_bytes: i64,
}

const LOOKUP_SQL: &str = r#"
    SELECT * FROM cache_entries
    WHERE media_id = ? AND resolution = ? AND format = ? AND expires_at > ?
    ORDER BY id DESC
    LIMIT 1
"#;

#[async_trait]
impl CacheLedger for SqliteCacheLedger {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media_id TEXT NOT NULL,
                resolution TEXT NOT NULL,
                format TEXT NOT NULL,
                path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_key \
             ON cache_entries (media_id, resolution, format)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_last_accessed \
             ON cache_entries (last_accessed_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires \
             ON cache_entries (expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        debug!("Cache ledger schema ready");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn lookup(
        &self,
        media_id: &str,
        resolution: &str,
        format: &str,
        now_ms: i64,
    ) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(LOOKUP_SQL)
            .bind(media_id)
            .bind(resolution)
            .bind(format)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(row.map(CacheEntry::from))
    }

    #[instrument(skip(self, new_entry))]
    async fn insert(
        &self,
        new_entry: NewCacheEntry,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<CacheEntry> {
        let mut tx = WriteTransaction::begin(&self.pool).await?;

        let existing = sqlx::query_as::<_, CacheEntryRow>(LOOKUP_SQL)
            .bind(&new_entry.media_id)
            .bind(&new_entry.resolution)
            .bind(&new_entry.format)
            .bind(now_ms)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        if let Some(row) = existing {
            tx.commit().await?;
            debug!(
                "Cache entry for {}:{}:{} already present as row {}",
                new_entry.media_id, new_entry.resolution, new_entry.format, row.id
            );
            return Ok(CacheEntry::from(row));
        }

        let expires_at = now_ms + ttl_ms;
        let result = sqlx::query(
            r#"
            INSERT INTO cache_entries
                (media_id, resolution, format, path, size_bytes, duration_seconds,
                 created_at, last_accessed_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_entry.media_id)
        .bind(&new_entry.resolution)
        .bind(&new_entry.format)
        .bind(&new_entry.path)
        .bind(new_entry.size_bytes as i64)
        .bind(new_entry.duration_seconds)
        .bind(now_ms)
        .bind(now_ms)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        tx.commit().await?;

        let id = result.last_insert_rowid();
        debug!(
            "Recorded cache entry {} for {}:{}:{} at {}",
            id, new_entry.media_id, new_entry.resolution, new_entry.format, new_entry.path
        );

        Ok(CacheEntry {
            id,
            media_id: new_entry.media_id,
            resolution: new_entry.resolution,
            format: new_entry.format,
            path: new_entry.path,
            size_bytes: new_entry.size_bytes,
            duration_seconds: new_entry.duration_seconds,
            created_at: now_ms,
            last_accessed_at: now_ms,
            expires_at,
        })
    }

    #[instrument(skip(self))]
    async fn touch(&self, entry_id: i64, now_ms: i64) -> Result<()> {
        let result = sqlx::query("UPDATE cache_entries SET last_accessed_at = ? WHERE id = ?")
            .bind(now_ms)
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CacheError::EntryNotFound { id: entry_id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn extend(&self, entry_id: i64, now_ms: i64, ttl_ms: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE cache_entries SET last_accessed_at = ?, expires_at = ? WHERE id = ?")
                .bind(now_ms)
                .bind(now_ms + ttl_ms)
                .bind(entry_id)
                .execute(&self.pool)
                .await
                .map_err(|e| CacheError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CacheError::EntryNotFound { id: entry_id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn expired_entries(&self, now_ms: i64) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            "SELECT * FROM cache_entries WHERE expires_at < ? ORDER BY expires_at ASC",
        )
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    #[instrument(skip(self))]
    async fn entries_for_size_cleanup(&self, max_bytes: u64) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            "SELECT * FROM cache_entries ORDER BY last_accessed_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        let entries: Vec<CacheEntry> = rows.into_iter().map(CacheEntry::from).collect();
        let mut remaining: u64 = entries.iter().map(|e| e.size_bytes).sum();

        let mut victims = Vec::new();
        for entry in entries {
            if remaining <= max_bytes {
                break;
            }
            remaining = remaining.saturating_sub(entry.size_bytes);
            victims.push(entry);
        }
        Ok(victims)
    }

    #[instrument(skip(self))]
    async fn remove(&self, entry_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CacheError::EntryNotFound { id: entry_id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_many(&self, entry_ids: &[i64]) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; entry_ids.len()].join(", ");
        let sql = format!("DELETE FROM cache_entries WHERE id IN ({placeholders})");

        let mut query = sqlx::query(&sql);
        for id in entry_ids {
            query = query.bind(*id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn remove_for_media(&self, media_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE media_id = ?")
            .bind(media_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!("Removed {} cache entries for media {}", removed, media_id);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn all_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows =
            sqlx::query_as::<_, CacheEntryRow>("SELECT * FROM cache_entries ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    #[instrument(skip(self))]
    async fn stats(&self, now_ms: i64) -> Result<LedgerStats> {
        let row = sqlx::query_as::<_, LedgerStatsRow>(
            r#"
            SELECT
                COUNT(*) as entry_count,
                COALESCE(SUM(CASE WHEN expires_at > ? THEN 1 ELSE 0 END), 0) as live_count,
                COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0) as expired_count,
                COALESCE(SUM(size_bytes), 0) as total_bytes
            FROM cache_entries
            "#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(LedgerStats {
            entry_count: row.entry_count.max(0) as u64,
            live_count: row.live_count.max(0) as u64,
            expired_count: row.expired_count.max(0) as u64,
            total_bytes: row.total_bytes.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::sync::Arc;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    async fn create_test_ledger() -> SqliteCacheLedger {
        // Each sqlite `:memory:` connection is its own database, so the pool
        // is capped at one connection that every query shares.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory database");
        let ledger = SqliteCacheLedger::new(pool);
        ledger.initialize().await.expect("Failed to create schema");
        ledger
    }

    fn new_entry(media_id: &str, path: &str, size_bytes: u64) -> NewCacheEntry {
        NewCacheEntry {
            media_id: media_id.to_string(),
            resolution: "720p".to_string(),
            format: "mp4".to_string(),
            path: path.to_string(),
            size_bytes,
            duration_seconds: 120.0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let ledger = create_test_ledger().await;

        let inserted = ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 5_000_000), 1_000, HOUR_MS)
            .await
            .unwrap();
        assert!(inserted.id > 0);
        assert_eq!(inserted.expires_at, 1_000 + HOUR_MS);
        assert_eq!(inserted.last_accessed_at, 1_000);

        let found = ledger
            .lookup("m1", "720p", "mp4", 1_000)
            .await
            .unwrap()
            .expect("entry should be live");
        assert_eq!(found, inserted);
    }

    #[tokio::test]
    async fn test_lookup_miss_for_unknown_key() {
        let ledger = create_test_ledger().await;

        ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 100), 0, HOUR_MS)
            .await
            .unwrap();

        assert!(ledger
            .lookup("m2", "720p", "mp4", 0)
            .await
            .unwrap()
            .is_none());
        assert!(ledger
            .lookup("m1", "1080p", "mp4", 0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_lookup_treats_expired_entry_as_absent() {
        let ledger = create_test_ledger().await;

        ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 100), 0, 1_000)
            .await
            .unwrap();

        assert!(ledger
            .lookup("m1", "720p", "mp4", 999)
            .await
            .unwrap()
            .is_some());
        assert!(ledger
            .lookup("m1", "720p", "mp4", 1_000)
            .await
            .unwrap()
            .is_none());

        // The row stays in place for the sweeper.
        assert_eq!(ledger.all_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_for_live_entry() {
        let ledger = create_test_ledger().await;

        let first = ledger
            .insert(new_entry("m1", "/cache/a.mp4", 100), 0, HOUR_MS)
            .await
            .unwrap();
        let second = ledger
            .insert(new_entry("m1", "/cache/b.mp4", 200), 10, HOUR_MS)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.path, "/cache/a.mp4");
        assert_eq!(ledger.all_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_after_expiry_creates_new_row() {
        let ledger = create_test_ledger().await;

        let first = ledger
            .insert(new_entry("m1", "/cache/a.mp4", 100), 0, 1_000)
            .await
            .unwrap();
        let second = ledger
            .insert(new_entry("m1", "/cache/b.mp4", 200), 2_000, 1_000)
            .await
            .unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(second.path, "/cache/b.mp4");
        // The expired row lingers until a sweep.
        assert_eq!(ledger.all_entries().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_inserts_on_shared_pool_converge_to_one_row() {
        // A file-backed pool with several connections, the shape a host
        // application hands the service. Every insert must succeed even when
        // the transactions run on different connections at once.
        let dir = std::env::temp_dir().join("cache-ledger-race");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("Failed to create scratch directory");

        let options = SqliteConnectOptions::new()
            .filename(dir.join("ledger.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .expect("Failed to create file-backed database");
        let ledger = Arc::new(SqliteCacheLedger::new(pool));
        ledger.initialize().await.expect("Failed to create schema");

        let mut tasks = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                ledger
                    .insert(new_entry("m1", &format!("/cache/{i}.mp4"), 100), 0, HOUR_MS)
                    .await
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }

        // Whoever wins the race writes the row; everyone else reads it back.
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(ledger.all_entries().await.unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_touch_updates_last_accessed_only() {
        let ledger = create_test_ledger().await;

        let entry = ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 100), 0, HOUR_MS)
            .await
            .unwrap();
        ledger.touch(entry.id, 5_000).await.unwrap();

        let entries = ledger.all_entries().await.unwrap();
        assert_eq!(entries[0].last_accessed_at, 5_000);
        assert_eq!(entries[0].expires_at, entry.expires_at);
    }

    #[tokio::test]
    async fn test_touch_missing_entry_errors() {
        let ledger = create_test_ledger().await;

        let err = ledger.touch(999, 0).await.unwrap_err();
        assert!(matches!(err, CacheError::EntryNotFound { id: 999 }));
    }

    #[tokio::test]
    async fn test_extend_makes_expiring_entry_retrievable_again() {
        let ledger = create_test_ledger().await;

        let entry = ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 100), 0, 1_000)
            .await
            .unwrap();

        // About to expire at t=1000; extend at t=900 pushes expiry to t=1900.
        ledger.extend(entry.id, 900, 1_000).await.unwrap();

        let found = ledger.lookup("m1", "720p", "mp4", 1_500).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().expires_at, 1_900);
    }

    #[tokio::test]
    async fn test_expired_entries_returns_only_past_expiry() {
        let ledger = create_test_ledger().await;

        let e1 = ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 10), 0, 1_000)
            .await
            .unwrap();
        let e2 = ledger
            .insert(new_entry("m2", "/cache/m2.mp4", 20), 0, 2_000)
            .await
            .unwrap();
        ledger
            .insert(new_entry("m3", "/cache/m3.mp4", 30), 0, 3_000)
            .await
            .unwrap();

        let expired = ledger.expired_entries(2_500).await.unwrap();
        let ids: Vec<i64> = expired.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![e1.id, e2.id]);
    }

    #[tokio::test]
    async fn test_size_cleanup_selects_least_recently_accessed() {
        let ledger = create_test_ledger().await;

        let a = ledger
            .insert(new_entry("m-a", "/cache/a.mp4", 10), 0, HOUR_MS)
            .await
            .unwrap();
        let b = ledger
            .insert(new_entry("m-b", "/cache/b.mp4", 20), 0, HOUR_MS)
            .await
            .unwrap();
        let c = ledger
            .insert(new_entry("m-c", "/cache/c.mp4", 30), 0, HOUR_MS)
            .await
            .unwrap();
        let d = ledger
            .insert(new_entry("m-d", "/cache/d.mp4", 40), 0, HOUR_MS)
            .await
            .unwrap();

        // Access order oldest-first: b, c, d, a.
        ledger.touch(a.id, 400).await.unwrap();
        ledger.touch(b.id, 100).await.unwrap();
        ledger.touch(c.id, 200).await.unwrap();
        ledger.touch(d.id, 300).await.unwrap();

        // Total is 100; removing b (20) and c (30) reaches the 50-byte
        // budget exactly, and nothing more is selected.
        let victims = ledger.entries_for_size_cleanup(50).await.unwrap();
        let ids: Vec<i64> = victims.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, c.id]);
    }

    #[tokio::test]
    async fn test_size_cleanup_ties_break_by_insertion_order() {
        let ledger = create_test_ledger().await;

        let first = ledger
            .insert(new_entry("m-a", "/cache/a.mp4", 40), 0, HOUR_MS)
            .await
            .unwrap();
        let second = ledger
            .insert(new_entry("m-b", "/cache/b.mp4", 30), 0, HOUR_MS)
            .await
            .unwrap();
        ledger
            .insert(new_entry("m-c", "/cache/c.mp4", 20), 0, HOUR_MS)
            .await
            .unwrap();
        ledger
            .insert(new_entry("m-d", "/cache/d.mp4", 10), 0, HOUR_MS)
            .await
            .unwrap();

        let victims = ledger.entries_for_size_cleanup(50).await.unwrap();
        let ids: Vec<i64> = victims.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_size_cleanup_within_budget_returns_empty() {
        let ledger = create_test_ledger().await;

        ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 100), 0, HOUR_MS)
            .await
            .unwrap();

        assert!(ledger
            .entries_for_size_cleanup(1_000)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_remove_many() {
        let ledger = create_test_ledger().await;

        let e1 = ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 10), 0, HOUR_MS)
            .await
            .unwrap();
        let e2 = ledger
            .insert(new_entry("m2", "/cache/m2.mp4", 20), 0, HOUR_MS)
            .await
            .unwrap();
        let e3 = ledger
            .insert(new_entry("m3", "/cache/m3.mp4", 30), 0, HOUR_MS)
            .await
            .unwrap();

        assert_eq!(ledger.remove_many(&[]).await.unwrap(), 0);
        assert_eq!(ledger.remove_many(&[e1.id, e2.id]).await.unwrap(), 2);
        ledger.remove(e3.id).await.unwrap();
        assert!(ledger.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_entry_errors() {
        let ledger = create_test_ledger().await;

        let err = ledger.remove(42).await.unwrap_err();
        assert!(matches!(err, CacheError::EntryNotFound { id: 42 }));
    }

    #[tokio::test]
    async fn test_remove_for_media_spans_resolutions() {
        let ledger = create_test_ledger().await;

        ledger
            .insert(new_entry("m1", "/cache/m1-720.mp4", 10), 0, HOUR_MS)
            .await
            .unwrap();
        let mut hi = new_entry("m1", "/cache/m1-1080.mp4", 20);
        hi.resolution = "1080p".to_string();
        ledger.insert(hi, 0, HOUR_MS).await.unwrap();
        ledger
            .insert(new_entry("m2", "/cache/m2.mp4", 30), 0, HOUR_MS)
            .await
            .unwrap();

        assert_eq!(ledger.remove_for_media("m1").await.unwrap(), 2);
        assert!(ledger
            .lookup("m2", "720p", "mp4", 0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_stats_aggregates() {
        let ledger = create_test_ledger().await;

        ledger
            .insert(new_entry("m1", "/cache/m1.mp4", 10), 0, 10_000)
            .await
            .unwrap();
        ledger
            .insert(new_entry("m2", "/cache/m2.mp4", 20), 0, 10_000)
            .await
            .unwrap();
        ledger
            .insert(new_entry("m3", "/cache/m3.mp4", 30), 0, 1)
            .await
            .unwrap();

        let stats = ledger.stats(5_000).await.unwrap();
        assert_eq!(stats.entry_count, 3);
        assert_eq!(stats.live_count, 2);
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.total_bytes, 60);
    }

    #[tokio::test]
    async fn test_stats_on_empty_ledger() {
        let ledger = create_test_ledger().await;

        let stats = ledger.stats(0).await.unwrap();
        assert_eq!(stats, LedgerStats::default());
    }
}

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{StoreError, StoreLimits};

/// File name of the SQLite database inside a store directory.
pub const DB_FILE: &str = "seen.db";

// ============================================================================
// Seen-Set Store
// ============================================================================

/// Durable set of (feed, item) pairs that have already been processed.
///
/// The store is a directory holding a single SQLite file. The pool is capped
/// at one connection: every write is serialized through it, and a pending
/// per-item transaction holds it until commit or rollback.
pub struct SeenStore {
    pub(crate) pool: SqlitePool,
    pub(crate) dir: PathBuf,
    pub(crate) limits: StoreLimits,
}

impl SeenStore {
    /// Open (or create) the store directory and run migrations.
    ///
    /// Before connecting, any half-finished compaction swap left behind by a
    /// killed process is resolved so that exactly one consistent store
    /// directory exists.
    pub async fn open(dir: &Path, limits: StoreLimits) -> Result<Self, StoreError> {
        recover_interrupted_swap(dir)?;
        Self::open_at(dir, limits).await
    }

    /// Open without swap recovery. Used for staging directories.
    pub(crate) async fn open_at(dir: &Path, limits: StoreLimits) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;

        // SEC-007: Store directory is user-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to set store directory permissions to 0700");
            }
        }

        let db_path = dir.join(DB_FILE);
        let mut options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            // Rollback journal keeps the store a single file once closed,
            // which is what the compaction swap moves around.
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full)
            .pragma("busy_timeout", "5000");
        if let Some(pages) = limits.max_page_count() {
            options = options.pragma("max_page_count", pages.to_string());
        }

        // Single writer: one connection serializes every mutation. No idle
        // reaping so a pending transaction is never cut from under us.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self {
            pool,
            dir: dir.to_path_buf(),
            limits,
        };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!(path = %db_path.display(), "Opened seen-set store");
        Ok(store)
    }

    /// Create the schema. Idempotent (`IF NOT EXISTS`).
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // WITHOUT ROWID: the (feed_id, item_id) key is the whole identity
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen (
                feed_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                seen_at INTEGER NOT NULL,
                PRIMARY KEY (feed_id, item_id)
            ) WITHOUT ROWID
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Size of the database file on disk, 0 if it cannot be read.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(self.dir.join(DB_FILE))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Close the pool, flushing everything to disk.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// ============================================================================
// Directory layout for compaction
// ============================================================================

/// `<dir>.compact`: where a rebuilt store is written before the swap.
pub(crate) fn staging_dir(dir: &Path) -> PathBuf {
    sibling_with_suffix(dir, "compact")
}

/// `<dir>.old`: where the live store is parked during the swap.
pub(crate) fn retired_dir(dir: &Path) -> PathBuf {
    sibling_with_suffix(dir, "old")
}

fn sibling_with_suffix(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

/// Resolve whatever a killed compaction left on disk.
///
/// | live | old | action                                   |
/// |------|-----|------------------------------------------|
/// | no   | yes | crash between renames: restore old       |
/// | yes  | yes | crash before cleanup: drop old           |
///
/// A staging directory is always incomplete from our point of view and is
/// removed.
fn recover_interrupted_swap(dir: &Path) -> Result<(), StoreError> {
    let retired = retired_dir(dir);
    let staging = staging_dir(dir);

    if retired.exists() {
        if dir.exists() {
            tracing::warn!(path = %retired.display(), "Removing leftover store from completed compaction");
            std::fs::remove_dir_all(&retired)?;
        } else {
            tracing::warn!(path = %dir.display(), "Restoring store from interrupted compaction");
            std::fs::rename(&retired, dir)?;
        }
    }

    if staging.exists() {
        tracing::warn!(path = %staging.display(), "Removing stale compaction staging directory");
        std::fs::remove_dir_all(&staging)?;
    }

    Ok(())
}

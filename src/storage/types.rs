use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Seen-set storage errors.
///
/// A uniqueness conflict on insert is not an error; it comes back as
/// [`MarkOutcome::AlreadySeen`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store reached its configured size limit or the disk is full
    #[error("Seen-set store is full (size limit reached or disk full)")]
    Full,

    /// Filesystem operation on the store directory failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema creation failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// A rebuilt store did not contain the expected number of records
    #[error("Rebuilt store holds {actual} records, expected {expected}")]
    RebuildMismatch { expected: usize, actual: usize },

    /// Rebuild target already holds something
    #[error("Refusing to rebuild into non-empty directory {}", .0.display())]
    TargetNotEmpty(std::path::PathBuf),

    /// Generic database error (corruption, locking, I/O inside SQLite)
    #[error("Store database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, separating out the "disk full" family.
    ///
    /// SQLITE_FULL (13) is raised both for a real full disk and when the
    /// `max_page_count` limit derived from `size_limit_mb` is reached.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("13") {
                return StoreError::Full;
            }
        }

        let error_string = err.to_string().to_lowercase();
        if error_string.contains("database or disk is full") || error_string.contains("sqlite_full")
        {
            return StoreError::Full;
        }

        StoreError::Database(err)
    }
}

/// Returns true if the error is a UNIQUE constraint violation.
pub(crate) fn is_uniqueness_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// ============================================================================
// Data Structures
// ============================================================================

/// One persisted (feed, item) pair.
///
/// `seen_at` is informational: two records with the same pair are the same
/// logical record regardless of timestamp.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SeenRecord {
    pub feed_id: String,
    pub item_id: String,
    pub seen_at: i64,
}

impl SeenRecord {
    pub fn new(feed_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            item_id: item_id.into(),
            seen_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The identity key of the record.
    pub fn key(&self) -> (&str, &str) {
        (&self.feed_id, &self.item_id)
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The pair was new and is now recorded
    Inserted,
    /// The pair already existed; nothing changed
    AlreadySeen,
}

/// Sizing knobs applied when a store file is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreLimits {
    /// Upper bound on the database file size in bytes. `None` = unbounded.
    pub max_bytes: Option<u64>,
}

impl StoreLimits {
    /// SQLite default page size; `max_page_count` is expressed in pages.
    const PAGE_SIZE: u64 = 4096;

    pub fn from_megabytes(mb: u64) -> Self {
        if mb == 0 {
            return Self::default();
        }
        Self {
            max_bytes: Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    pub(crate) fn max_page_count(&self) -> Option<u64> {
        self.max_bytes.map(|b| (b / Self::PAGE_SIZE).max(1))
    }
}

/// Outcome of a completed compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub records: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

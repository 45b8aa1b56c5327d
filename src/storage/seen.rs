use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, Transaction};

use super::schema::SeenStore;
use super::types::{is_uniqueness_conflict, MarkOutcome, SeenRecord, StoreError};

/// Bind parameters per IN (...) chunk, well under SQLite's 999 limit.
const BATCH_SIZE: usize = 500;

// ============================================================================
// Pending Mark
// ============================================================================

/// An uncommitted insert of one (feed, item) pair.
///
/// Holds the store's only connection until [`commit`](Self::commit) or
/// drop. Dropping without committing rolls the insert back, leaving the
/// item unseen for the next run.
pub struct PendingMark {
    tx: Transaction<'static, Sqlite>,
    outcome: MarkOutcome,
}

impl PendingMark {
    pub fn outcome(&self) -> MarkOutcome {
        self.outcome
    }

    pub async fn commit(self) -> Result<MarkOutcome, StoreError> {
        self.tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(self.outcome)
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(StoreError::from_sqlx)
    }
}

impl SeenStore {
    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the ids from `ids` that have no record for `feed_id`.
    ///
    /// Output keeps input order with duplicates removed. All chunks are read
    /// inside one transaction, so the answer reflects a single committed
    /// state of the store.
    pub async fn unseen(&self, feed_id: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let mut seen: HashSet<String> = HashSet::new();

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT item_id FROM seen WHERE feed_id = ");
            builder.push_bind(feed_id);
            builder.push(" AND item_id IN (");

            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder
                .build_query_as()
                .fetch_all(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
            seen.extend(rows.into_iter().map(|(id,)| id));
        }

        tx.rollback().await.map_err(StoreError::from_sqlx)?;

        let mut emitted: HashSet<&str> = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| !seen.contains(id.as_str()) && emitted.insert(id.as_str()))
            .cloned()
            .collect())
    }

    /// Full snapshot of the store, ordered by (feed_id, item_id).
    pub async fn export_all(&self) -> Result<Vec<SeenRecord>, StoreError> {
        sqlx::query_as::<_, SeenRecord>(
            "SELECT feed_id, item_id, seen_at FROM seen ORDER BY feed_id, item_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    /// Number of recorded pairs.
    pub async fn len(&self) -> Result<usize, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count.0 as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Record a pair and commit immediately.
    ///
    /// Idempotent: recording an existing pair succeeds with
    /// [`MarkOutcome::AlreadySeen`].
    pub async fn mark_seen(&self, feed_id: &str, item_id: &str) -> Result<MarkOutcome, StoreError> {
        self.begin_mark(feed_id, item_id).await?.commit().await
    }

    /// Insert a pair inside a fresh transaction and hand the transaction back
    /// uncommitted.
    ///
    /// No existence check first: the primary key rejects a duplicate, which
    /// comes back as [`MarkOutcome::AlreadySeen`]. Any other failure
    /// propagates.
    pub async fn begin_mark(&self, feed_id: &str, item_id: &str) -> Result<PendingMark, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query("INSERT INTO seen (feed_id, item_id, seen_at) VALUES (?, ?, ?)")
            .bind(feed_id)
            .bind(item_id)
            .bind(now)
            .execute(&mut *tx)
            .await;

        let outcome = match result {
            Ok(_) => MarkOutcome::Inserted,
            Err(e) if is_uniqueness_conflict(&e) => {
                tracing::debug!(feed = %feed_id, item = %item_id, "Pair already recorded");
                MarkOutcome::AlreadySeen
            }
            Err(e) => return Err(StoreError::from_sqlx(e)),
        };

        Ok(PendingMark { tx, outcome })
    }
}

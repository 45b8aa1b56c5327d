use std::path::Path;

use sqlx::{QueryBuilder, Sqlite};

use super::schema::{retired_dir, staging_dir, SeenStore};
use super::types::{CompactionReport, SeenRecord, StoreError, StoreLimits};

/// Rows per multi-VALUES insert (3 binds each).
const BATCH_SIZE: usize = 300;

impl SeenStore {
    /// Build a fresh store at `dir` holding exactly `records`.
    ///
    /// All rows go in through one transaction and the row count is checked
    /// afterwards. `dir` must be missing or empty; anything else is refused
    /// with [`StoreError::TargetNotEmpty`] and left untouched.
    pub async fn rebuild_from(
        dir: &Path,
        records: &[SeenRecord],
        limits: StoreLimits,
    ) -> Result<Self, StoreError> {
        if dir.exists() && std::fs::read_dir(dir)?.next().is_some() {
            return Err(StoreError::TargetNotEmpty(dir.to_path_buf()));
        }
        let store = Self::open_at(dir, limits).await?;

        let mut tx = store.pool.begin().await.map_err(StoreError::from_sqlx)?;
        for chunk in records.chunks(BATCH_SIZE) {
            // OR IGNORE: a snapshot never holds duplicates, but a hand-built
            // record list might.
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO seen (feed_id, item_id, seen_at) ");
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.feed_id)
                    .push_bind(&record.item_id)
                    .push_bind(record.seen_at);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
        }
        tx.commit().await.map_err(StoreError::from_sqlx)?;

        let expected = distinct_keys(records);
        let actual = store.len().await?;
        if actual != expected {
            return Err(StoreError::RebuildMismatch { expected, actual });
        }

        Ok(store)
    }

    /// Rebuild this store from its own export and swap it into place.
    ///
    /// The live store stays open and untouched until the rebuilt copy is
    /// fully written and verified. The swap itself is two renames; if the
    /// second one fails the first is undone. On any error after the live
    /// pool was closed, the store at `self.dir` is reopened so `self` stays
    /// usable.
    pub async fn compact(&mut self) -> Result<CompactionReport, StoreError> {
        let bytes_before = self.file_size();
        let records = self.export_all().await?;
        let staging = staging_dir(&self.dir);
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }

        let rebuilt = Self::rebuild_from(&staging, &records, self.limits).await;
        let rebuilt = match rebuilt {
            Ok(store) => store,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        };
        rebuilt.close().await;

        // Point of no return for the live pool
        self.pool.close().await;
        let swapped = swap_into_place(&self.dir, &staging);
        let reopened = Self::open(&self.dir, self.limits).await?;
        self.pool = reopened.pool;
        swapped?;

        let report = CompactionReport {
            records: records.len(),
            bytes_before,
            bytes_after: self.file_size(),
        };
        tracing::info!(
            path = %self.dir.display(),
            records = report.records,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "Seen-set store compacted"
        );
        Ok(report)
    }
}

/// live -> live.old, staging -> live, remove live.old.
fn swap_into_place(live: &Path, staging: &Path) -> Result<(), StoreError> {
    let retired = retired_dir(live);
    if retired.exists() {
        std::fs::remove_dir_all(&retired)?;
    }

    if let Err(e) = std::fs::rename(live, &retired) {
        let _ = std::fs::remove_dir_all(staging);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(staging, live) {
        tracing::error!(error = %e, "Failed to move rebuilt store into place, restoring previous store");
        std::fs::rename(&retired, live)?;
        let _ = std::fs::remove_dir_all(staging);
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_dir_all(&retired) {
        // Harmless: open() removes it next time
        tracing::warn!(path = %retired.display(), error = %e, "Failed to remove retired store directory");
    }
    Ok(())
}

fn distinct_keys(records: &[SeenRecord]) -> usize {
    records
        .iter()
        .map(SeenRecord::key)
        .collect::<std::collections::HashSet<_>>()
        .len()
}

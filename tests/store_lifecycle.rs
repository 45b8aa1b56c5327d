//! Integration tests for the seen-set store: mark, diff, export, compact,
//! reopen.
//!
//! Each test works in its own temporary directory.

use feedwatch::storage::{MarkOutcome, SeenRecord, SeenStore, StoreLimits, DB_FILE};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn test_store() -> (TempDir, SeenStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SeenStore::open(&dir.path().join("seen"), StoreLimits::default())
        .await
        .unwrap();
    (dir, store)
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Mark / Diff
// ============================================================================

#[tokio::test]
async fn test_mark_twice_keeps_one_record() {
    let (_dir, store) = test_store().await;

    assert_eq!(store.mark_seen("F", "1").await.unwrap(), MarkOutcome::Inserted);
    assert_eq!(store.mark_seen("F", "1").await.unwrap(), MarkOutcome::AlreadySeen);
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unseen_excludes_marked_and_keeps_order() {
    let (_dir, store) = test_store().await;
    store.mark_seen("F", "a").await.unwrap();

    let unseen = store.unseen("F", &ids(&["a", "b", "c"])).await.unwrap();
    assert_eq!(unseen, ids(&["b", "c"]));
}

#[tokio::test]
async fn test_same_item_id_is_independent_per_feed() {
    let (_dir, store) = test_store().await;
    store.mark_seen("F", "1").await.unwrap();

    assert!(store.unseen("F", &ids(&["1"])).await.unwrap().is_empty());
    assert_eq!(store.unseen("G", &ids(&["1"])).await.unwrap(), ids(&["1"]));
}

#[tokio::test]
async fn test_dropped_pending_mark_leaves_item_unseen() {
    let (_dir, store) = test_store().await;

    {
        let pending = store.begin_mark("F", "1").await.unwrap();
        assert_eq!(pending.outcome(), MarkOutcome::Inserted);
        // dropped without commit
    }

    assert_eq!(store.unseen("F", &ids(&["1"])).await.unwrap(), ids(&["1"]));
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen");

    let store = SeenStore::open(&path, StoreLimits::default()).await.unwrap();
    store.mark_seen("F", "1").await.unwrap();
    store.close().await;

    assert!(path.join(DB_FILE).exists());

    let store = SeenStore::open(&path, StoreLimits::default()).await.unwrap();
    assert!(store.unseen("F", &ids(&["1"])).await.unwrap().is_empty());
}

// ============================================================================
// Export / Compaction
// ============================================================================

#[tokio::test]
async fn test_export_is_sorted_by_key() {
    let (_dir, store) = test_store().await;
    store.mark_seen("G", "1").await.unwrap();
    store.mark_seen("F", "2").await.unwrap();
    store.mark_seen("F", "1").await.unwrap();

    let keys: Vec<(String, String)> = store
        .export_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.feed_id, r.item_id))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("F".to_string(), "1".to_string()),
            ("F".to_string(), "2".to_string()),
            ("G".to_string(), "1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_rebuild_from_export_answers_identically() {
    let (dir, store) = test_store().await;
    for id in ["1", "2", "3"] {
        store.mark_seen("F", id).await.unwrap();
    }
    let records = store.export_all().await.unwrap();

    let rebuilt = SeenStore::rebuild_from(&dir.path().join("copy"), &records, StoreLimits::default())
        .await
        .unwrap();

    let probe = ids(&["1", "2", "3", "4"]);
    assert_eq!(
        store.unseen("F", &probe).await.unwrap(),
        rebuilt.unseen("F", &probe).await.unwrap()
    );
}

#[tokio::test]
async fn test_rebuild_tolerates_duplicate_records() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![SeenRecord::new("F", "1"), SeenRecord::new("F", "1")];

    let store = SeenStore::rebuild_from(&dir.path().join("seen"), &records, StoreLimits::default())
        .await
        .unwrap();
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_compact_keeps_records_and_store_stays_usable() {
    let (dir, mut store) = test_store().await;
    for i in 0..50 {
        store.mark_seen("F", &i.to_string()).await.unwrap();
    }

    let report = store.compact().await.unwrap();
    assert_eq!(report.records, 50);
    assert!(!dir.path().join("seen.compact").exists());
    assert!(!dir.path().join("seen.old").exists());

    assert_eq!(store.len().await.unwrap(), 50);
    assert_eq!(store.mark_seen("F", "new").await.unwrap(), MarkOutcome::Inserted);
}

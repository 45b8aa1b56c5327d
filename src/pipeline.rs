//! One polling run: fetch each feed, diff against the seen-set, mark and
//! notify every new item.
//!
//! Per item the order is fixed: open the insert, deliver, commit. Once the
//! commit lands the item is seen for good, delivered or not. A crash
//! between delivery and commit rolls the insert back, so that item is
//! announced again on the next run.

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{extract_all, Document, FetchError, Fetcher};
use crate::notify::Notifier;
use crate::storage::{CompactionReport, MarkOutcome, SeenStore, StoreError};

/// Why a single feed produced no report.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Feed-level; the run moves on to the next feed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Aborts the run.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters for one feed in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub feed_url: String,
    /// Items extracted successfully.
    pub extracted: usize,
    /// Items dropped by extraction.
    pub skipped: usize,
    /// Extracted ids with no record at diff time.
    pub unseen: usize,
    pub notified: usize,
    pub delivery_failed: usize,
    /// Recorded by someone else between the diff and the insert.
    pub already_seen: usize,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    pub feeds: Vec<FeedReport>,
    /// `(feed_url, error)` for feeds that could not be fetched or parsed.
    pub failed_feeds: Vec<(String, String)>,
    pub compaction: Option<CompactionReport>,
}

impl RunSummary {
    /// True when every feed was fetched and parsed.
    pub fn is_success(&self) -> bool {
        self.failed_feeds.is_empty()
    }

    pub fn notified(&self) -> usize {
        self.feeds.iter().map(|f| f.notified).sum()
    }

    pub fn delivery_failed(&self) -> usize {
        self.feeds.iter().map(|f| f.delivery_failed).sum()
    }
}

/// Owns the collaborators for a run. Feeds are processed one after the
/// other; the store's single connection serializes all writes anyway.
pub struct Pipeline {
    feeds: Vec<String>,
    fetcher: Fetcher,
    notifier: Notifier,
    store: SeenStore,
    compact_after_run: bool,
}

impl Pipeline {
    pub fn new(config: &Config, client: reqwest::Client, store: SeenStore) -> Self {
        Self {
            feeds: config.feeds.clone(),
            fetcher: Fetcher::new(
                client.clone(),
                Duration::from_secs(config.fetch.timeout_secs),
                config.fetch.max_retries,
            ),
            notifier: Notifier::new(client, &config.notify),
            store,
            compact_after_run: config.store.compact_after_run,
        }
    }

    /// Replace the fetcher, e.g. to shorten retry backoff.
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Force compaction at the end of [`run`](Self::run).
    pub fn with_compaction(mut self, compact: bool) -> Self {
        self.compact_after_run |= compact;
        self
    }

    pub fn store(&self) -> &SeenStore {
        &self.store
    }

    pub fn into_store(self) -> SeenStore {
        self.store
    }

    /// Process every configured feed, then optionally compact.
    ///
    /// Only a store error ends the run early. Fetch failures are collected
    /// in [`RunSummary::failed_feeds`]; a failed compaction is logged and
    /// leaves `compaction` as `None`.
    pub async fn run(&mut self) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();

        for url in self.feeds.clone() {
            match self.process_feed(&url).await {
                Ok(report) => summary.feeds.push(report),
                Err(FeedError::Fetch(e)) => {
                    tracing::warn!(feed = %url, error = %e, "Feed failed, continuing with next feed");
                    summary.failed_feeds.push((url, e.to_string()));
                }
                Err(FeedError::Store(e)) => {
                    tracing::error!(feed = %url, error = %e, "Seen-set store failed, aborting run");
                    return Err(e);
                }
            }
        }

        if self.compact_after_run {
            match self.store.compact().await {
                Ok(report) => summary.compaction = Some(report),
                Err(e) => tracing::warn!(error = %e, "Compaction failed, store left as is"),
            }
        }

        tracing::info!(
            feeds = summary.feeds.len(),
            failed = summary.failed_feeds.len(),
            notified = summary.notified(),
            delivery_failed = summary.delivery_failed(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Fetch one feed and process its items. The feed URL is the feed id.
    pub async fn process_feed(&self, url: &str) -> Result<FeedReport, FeedError> {
        let doc = self.fetcher.fetch_document(url).await?;
        Ok(self.process_document(url, &doc).await?)
    }

    /// Diff, mark and notify the items of an already parsed feed.
    pub async fn process_document(
        &self,
        feed_id: &str,
        doc: &Document,
    ) -> Result<FeedReport, StoreError> {
        let mut report = FeedReport {
            feed_url: feed_id.to_string(),
            ..FeedReport::default()
        };

        let mut items = Vec::new();
        for result in extract_all(doc) {
            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(feed = %feed_id, error = %e, outcome = "skipped", "Item not extractable");
                    report.skipped += 1;
                }
            }
        }
        report.extracted = items.len();

        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let mut pending: HashSet<String> = self.store.unseen(feed_id, &ids).await?.into_iter().collect();
        report.unseen = pending.len();

        for item in &items {
            // Also drops repeats of an id within the same document
            if !pending.remove(&item.id) {
                continue;
            }

            let mark = self.store.begin_mark(feed_id, &item.id).await?;
            if mark.outcome() == MarkOutcome::AlreadySeen {
                mark.rollback().await?;
                tracing::warn!(feed = %feed_id, item = %item.id, outcome = "skipped", "Item already recorded");
                report.already_seen += 1;
                continue;
            }

            let delivery = self.notifier.notify(item).await;
            mark.commit().await?;

            match delivery {
                Ok(()) => {
                    tracing::info!(feed = %feed_id, item = %item.id, outcome = "processed", "Item notified");
                    report.notified += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        feed = %feed_id,
                        item = %item.id,
                        error = %e,
                        outcome = "delivery-failed",
                        "Item recorded but notification failed"
                    );
                    report.delivery_failed += 1;
                }
            }
        }

        tracing::info!(
            feed = %feed_id,
            extracted = report.extracted,
            skipped = report.skipped,
            unseen = report.unseen,
            notified = report.notified,
            delivery_failed = report.delivery_failed,
            "Feed processed"
        );
        Ok(report)
    }
}

//! Durable seen-set: which (feed, item) pairs have already been processed.

mod compact;
mod schema;
mod seen;
mod types;

pub use schema::{SeenStore, DB_FILE};
pub use seen::PendingMark;
pub use types::{CompactionReport, MarkOutcome, SeenRecord, StoreError, StoreLimits};

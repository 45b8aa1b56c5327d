//! Feed ingestion: fetch raw markup, build a document tree, extract items.
//!
//! - [`fetcher`] - HTTP GET with timeout, retry and a body size cap
//! - [`document`] - HTML-style node tree over the feed markup
//! - [`extract`] - `item` node -> [`FeedItem`]
//!
//! The only place that knows where a feed keeps its link URL is
//! [`extract`]; swapping to a differently-shaped source means touching that
//! module and nothing downstream.

mod document;
mod extract;
mod fetcher;

pub use document::{Document, DocumentError, NodeId};
pub use extract::{extract_all, extract_item, ExtractionError, FeedItem};
pub use fetcher::{FetchError, Fetcher};

use thiserror::Error;

use super::document::{Document, NodeId};

/// A normalized feed entry. Only `id` is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Feed-scoped identifier, stable across fetches
    pub id: String,
    /// May be empty
    pub title: String,
    pub link: String,
    /// Whitespace-trimmed; `None` when absent or blank
    pub description: Option<String>,
    pub author: Option<String>,
}

/// A required field could not be located in an item node.
///
/// These are item-level: the caller skips the item and keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("item has neither <guid> nor <dc:identifier>")]
    MissingId,

    #[error("item {id} has no link text after its <link> tag")]
    MissingLink { id: String },
}

/// Extract every `item` node in document order.
pub fn extract_all(doc: &Document) -> Vec<Result<FeedItem, ExtractionError>> {
    doc.items()
        .into_iter()
        .map(|node| extract_item(doc, node))
        .collect()
}

/// Turn one `item` node into a [`FeedItem`].
pub fn extract_item(doc: &Document, item: NodeId) -> Result<FeedItem, ExtractionError> {
    let id = first_text(doc, item, "guid")
        .or_else(|| first_text(doc, item, "dc:identifier"))
        .ok_or(ExtractionError::MissingId)?;

    let link = sibling_link(doc, item).ok_or_else(|| ExtractionError::MissingLink { id: id.clone() })?;

    Ok(FeedItem {
        title: first_text(doc, item, "title").unwrap_or_default(),
        description: first_text(doc, item, "description"),
        author: first_text(doc, item, "dc:creator"),
        id,
        link,
    })
}

/// Trimmed text of the first `tag` under `item`; `None` if missing or blank.
fn first_text(doc: &Document, item: NodeId, tag: &str) -> Option<String> {
    let node = doc.find_first(item, tag)?;
    non_blank(doc.text(node))
}

/// The URL sits in the text node right after `<link>`, not inside it.
fn sibling_link(doc: &Document, item: NodeId) -> Option<String> {
    let link = doc.find_first(item, "link")?;
    let next = doc.next_sibling(link).filter(|n| doc.is_text(*n))?;
    non_blank(doc.text(next))
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

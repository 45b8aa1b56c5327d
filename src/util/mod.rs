//! Shared helpers: URL policy checks applied to configuration, and
//! sanitizing of feed-supplied text.

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_feed_url, validate_webhook_url, UrlValidationError};

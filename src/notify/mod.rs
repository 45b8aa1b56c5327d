//! Outbound side: render a [`FeedItem`](crate::feed::FeedItem) and post it
//! to the chat webhook.

mod message;
mod webhook;

pub use message::render;
pub use webhook::{DeliveryError, Notifier, TOKEN_ENV_VAR};

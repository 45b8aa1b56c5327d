//! feedwatch: poll feeds, announce each new item on a chat webhook once.
//!
//! - [`feed`] - fetch, parse and extract items
//! - [`storage`] - durable seen-set of (feed, item) pairs
//! - [`notify`] - message rendering and webhook delivery
//! - [`pipeline`] - one run over all configured feeds
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod util;

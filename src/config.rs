//! Configuration file parser for `~/.config/feedwatch/config.toml`.
//!
//! The file is optional: a missing or empty file yields `Config::default()`,
//! which then fails [`Config::validate`] because no feeds or webhook are set.
//! Unknown keys are accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::storage::StoreLimits;
use crate::util::{validate_feed_url, validate_webhook_url};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed fine but cannot drive a run.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration, passed explicitly into the pipeline.
///
/// Every section uses `#[serde(default)]` so any subset of keys can be given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed URLs, polled in this order.
    pub feeds: Vec<String>,
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store directory; `seen.db` lives inside it.
    pub path: PathBuf,
    /// Upper bound on the database file. 0 = unbounded.
    pub size_limit_mb: u64,
    /// Compact after every run, not only on `--compact`.
    pub compact_after_run: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            size_limit_mb: 64,
            compact_after_run: false,
        }
    }
}

impl StoreConfig {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits::from_megabytes(self.size_limit_mb)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Retries after the first attempt on 429/5xx.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Webhook settings.
///
/// Custom Debug impl masks `token` and `webhook_url`; many webhook URLs
/// embed their secret in the path.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
    /// Bearer token (alternative to FEEDWATCH_WEBHOOK_TOKEN env var).
    /// Env var takes precedence over config file.
    pub token: Option<String>,
    pub unfurl_links: bool,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: "#feeds".to_string(),
            username: "feedwatch".to_string(),
            token: None,
            unfurl_links: true,
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field(
                "webhook_url",
                &(!self.webhook_url.is_empty()).then_some("[REDACTED]"),
            )
            .field("channel", &self.channel)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("unfurl_links", &self.unfurl_links)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `$HOME/.local/share/feedwatch/seen`, or `./seen` without a HOME.
fn default_store_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("feedwatch")
            .join("seen"),
        None => PathBuf::from("seen"),
    }
}

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("store", &["path", "size_limit_mb", "compact_after_run"]),
    ("fetch", &["timeout_secs", "max_retries"]),
    (
        "notify",
        &[
            "webhook_url",
            "channel",
            "username",
            "token",
            "unfurl_links",
            "timeout_secs",
        ],
    ),
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            store = %config.store.path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check that the config can drive a run.
    ///
    /// Feeds must be present and pass [`validate_feed_url`]; the webhook
    /// must be set and pass [`validate_webhook_url`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid("no feeds configured".into()));
        }
        for feed in &self.feeds {
            validate_feed_url(feed)
                .map_err(|e| ConfigError::Invalid(format!("feed {feed}: {e}")))?;
        }

        if self.notify.webhook_url.trim().is_empty() {
            return Err(ConfigError::Invalid("notify.webhook_url is not set".into()));
        }
        // The URL itself stays out of the message, it may carry a secret
        validate_webhook_url(&self.notify.webhook_url)
            .map_err(|e| ConfigError::Invalid(format!("notify.webhook_url: {e}")))?;

        if self.fetch.timeout_secs == 0 || self.notify.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }

        Ok(())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        if key == "feeds" {
            continue;
        }
        let Some((_, known)) = KNOWN_KEYS.iter().find(|(section, _)| *section == key.as_str()) else {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        };
        if let Some(table) = value.as_table() {
            for sub in table.keys() {
                if !known.contains(&sub.as_str()) {
                    tracing::warn!(key = %format!("{key}.{sub}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

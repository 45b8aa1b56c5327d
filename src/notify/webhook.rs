use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use super::message::render;
use crate::config::NotifyConfig;
use crate::feed::FeedItem;

/// Env var that overrides `notify.token` from the config file.
pub const TOKEN_ENV_VAR: &str = "FEEDWATCH_WEBHOOK_TOKEN";

/// A notification was not accepted by the channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Webhook request timed out")]
    Timeout,
    #[error("Webhook request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Webhook rejected message: status {0}")]
    HttpStatus(u16),
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    username: &'a str,
    text: String,
    unfurl_links: bool,
}

/// Posts rendered items to a chat webhook.
///
/// One request per item, no retry: a failed delivery is reported to the
/// caller and that is the end of it for this run.
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
    channel: String,
    username: String,
    token: Option<SecretString>,
    unfurl_links: bool,
    timeout: Duration,
}

impl Notifier {
    /// Build from config. `FEEDWATCH_WEBHOOK_TOKEN` takes precedence over
    /// `notify.token`.
    pub fn new(client: reqwest::Client, config: &NotifyConfig) -> Self {
        let token = std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| config.token.clone())
            .map(SecretString::from);

        Self {
            client,
            webhook_url: config.webhook_url.clone(),
            channel: config.channel.clone(),
            username: config.username.clone(),
            token,
            unfurl_links: config.unfurl_links,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Deliver one item. Any non-2xx answer or transport problem comes back
    /// as an `Err`; nothing here panics or retries.
    pub async fn notify(&self, item: &FeedItem) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            channel: &self.channel,
            username: &self.username,
            text: render(item),
            unfurl_links: self.unfurl_links,
        };

        let mut request = self.client.post(&self.webhook_url).json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| DeliveryError::Timeout)?
            .map_err(DeliveryError::Network)?;

        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }

        tracing::debug!(item = %item.id, status = %response.status(), "Webhook accepted message");
        Ok(())
    }
}

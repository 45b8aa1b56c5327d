use crate::feed::document::Document;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing one feed.
///
/// All of them are feed-level: the run moves on to the next feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed markup could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// HTTP GET side of the pipeline.
///
/// Retries 429, 5xx and truncated bodies with exponential backoff
/// (`backoff`, `2 * backoff`, `4 * backoff`, ...). Every attempt, body
/// included, is bounded by `timeout`.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client,
            timeout,
            max_retries,
            backoff: Duration::from_secs(2),
        }
    }

    /// Override the base backoff delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch `url` and parse it into a [`Document`].
    pub async fn fetch_document(&self, url: &str) -> Result<Document, FetchError> {
        let bytes = self.fetch(url).await?;
        Document::parse(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    /// Fetch the raw body of `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let err = match tokio::time::timeout(self.timeout, self.attempt(url)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) => e,
                Err(_) => return Err(FetchError::Timeout),
            };

            let retryable = match &err {
                FetchError::HttpStatus(429) => true,
                FetchError::HttpStatus(status) => *status >= 500,
                FetchError::IncompleteResponse { .. } => true,
                _ => false,
            };
            if !retryable {
                return Err(err);
            }
            if retry_count >= self.max_retries {
                return Err(match err {
                    FetchError::HttpStatus(429) => FetchError::RateLimited(self.max_retries),
                    other => other,
                });
            }

            let delay = self.backoff.saturating_mul(1u32 << retry_count.min(16));
            tracing::warn!(
                feed = %url,
                error = %err,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Feed fetch failed, retrying after delay"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: Network interruptions mid-body show up as a short read
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

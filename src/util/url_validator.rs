use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Why a configured URL was rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
    /// Webhook over plain http to a non-local host.
    #[error("Webhook must use https (http is only accepted for localhost)")]
    InsecureWebhook,
}

/// Validate a feed source URL.
///
/// Rejects non-http(s) schemes, localhost and private/link-local address
/// literals so a config file can't point the poller at internal services.
///
/// ```
/// use feedwatch::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/rss").is_ok());
/// assert!(validate_feed_url("http://localhost/rss").is_err());
/// assert!(validate_feed_url("http://192.168.1.1/rss").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(url_str)?;

    if is_local_host(&url) {
        return Err(UrlValidationError::Localhost);
    }
    if let Some(ip) = host_ip(&url) {
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

/// Validate the notification webhook URL: https, or http for localhost.
pub fn validate_webhook_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(url_str)?;

    if url.scheme() == "http" && !is_local_host(&url) {
        return Err(UrlValidationError::InsecureWebhook);
    }

    Ok(url)
}

fn parse_http(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn host_ip(url: &Url) -> Option<IpAddr> {
    let host = url.host_str()?;
    // Strip brackets from IPv6 addresses for parsing
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse().ok()
}

fn is_local_host(url: &Url) -> bool {
    if url.host_str() == Some("localhost") {
        return true;
    }
    host_ip(url).is_some_and(|ip| ip.is_loopback())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

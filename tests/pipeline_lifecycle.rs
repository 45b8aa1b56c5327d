//! Integration tests for full polling runs against mocked feed and webhook
//! endpoints, including restarts between runs.

use feedwatch::config::{Config, NotifyConfig};
use feedwatch::feed::Fetcher;
use feedwatch::pipeline::Pipeline;
use feedwatch::storage::{SeenStore, StoreLimits};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
  <title>Example</title>
  <item>
    <guid>post-1</guid>
    <title>First post</title>
    <link>https://example.com/1</link>
    <description>Hello.</description>
    <dc:creator>Ann</dc:creator>
  </item>
  <item>
    <guid>post-2</guid>
    <title>Second post</title>
    <link>https://example.com/2</link>
  </item>
</channel></rss>"#;

fn config(server: &MockServer) -> Config {
    Config {
        feeds: vec![format!("{}/rss", server.uri())],
        notify: NotifyConfig {
            webhook_url: format!("{}/hook", server.uri()),
            ..NotifyConfig::default()
        },
        ..Config::default()
    }
}

async fn run_once(config: &Config, store_dir: &Path) -> feedwatch::pipeline::RunSummary {
    let store = SeenStore::open(store_dir, StoreLimits::default()).await.unwrap();
    let fetcher = Fetcher::new(reqwest::Client::new(), Duration::from_secs(5), 0);
    let mut pipeline =
        Pipeline::new(config, reqwest::Client::new(), store).with_fetcher(fetcher);
    let summary = pipeline.run().await.unwrap();
    pipeline.into_store().close().await;
    summary
}

#[tokio::test]
async fn test_restart_does_not_renotify() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("seen");
    let config = config(&server);

    let first = run_once(&config, &store_dir).await;
    assert_eq!(first.notified(), 2);

    let second = run_once(&config, &store_dir).await;
    assert_eq!(second.notified(), 0);
    assert!(second.is_success());
}

#[tokio::test]
async fn test_message_carries_author_and_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("New post by Ann"))
        .and(body_string_contains("<https://example.com/1|First post>"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("New post by unknown author"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run_once(&config(&server), &dir.path().join("seen")).await;
    assert_eq!(summary.notified(), 2);
}

#[tokio::test]
async fn test_new_item_after_restart_is_the_only_notification() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("seen");
    let config = config(&server);

    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    assert_eq!(run_once(&config, &store_dir).await.notified(), 2);

    let updated = FEED.replace(
        "</channel>",
        "<item><guid>post-3</guid><link>https://example.com/3</link></item></channel>",
    );
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(updated))
        .mount(&server)
        .await;

    let summary = run_once(&config, &store_dir).await;
    assert_eq!(summary.feeds[0].unseen, 1);
    assert_eq!(summary.notified(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_not_retried_after_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("seen");
    let config = config(&server);

    let first = run_once(&config, &store_dir).await;
    assert_eq!(first.delivery_failed(), 2);
    // Delivery failures do not fail the run
    assert!(first.is_success());

    let second = run_once(&config, &store_dir).await;
    assert_eq!(second.delivery_failed(), 0);
    assert_eq!(second.notified(), 0);
}

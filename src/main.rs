use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use feedwatch::config::Config;
use feedwatch::pipeline::Pipeline;
use feedwatch::storage::SeenStore;

/// Get the default config path (~/.config/feedwatch/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedwatch")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedwatch", about = "Post new RSS items to a chat webhook, once each")]
struct Args {
    /// Config file (default: ~/.config/feedwatch/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compact the seen-set store after processing feeds
    #[arg(long)]
    compact: bool,

    /// Only compact the seen-set store; do not poll feeds
    #[arg(long, conflicts_with = "export")]
    compact_only: bool,

    /// Print every seen record as a JSON line and exit
    #[arg(long)]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut store = SeenStore::open(&config.store.path, config.store.limits())
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;

    if args.export {
        let records = store.export_all().await.context("Failed to export store")?;
        let mut out = std::io::stdout().lock();
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }
        store.close().await;
        return Ok(ExitCode::SUCCESS);
    }

    if args.compact_only {
        let report = store.compact().await.context("Compaction failed")?;
        println!(
            "Compacted {} records: {} -> {} bytes",
            report.records, report.bytes_before, report.bytes_after
        );
        store.close().await;
        return Ok(ExitCode::SUCCESS);
    }

    config.validate()?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mut pipeline = Pipeline::new(&config, client, store).with_compaction(args.compact);
    let summary = pipeline.run().await.context("Run aborted")?;
    pipeline.into_store().close().await;

    for (feed, error) in &summary.failed_feeds {
        eprintln!("Feed failed: {feed}: {error}");
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest downloader.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::CrawlerRegistry;
use sumi_harvest::hashing::HashEngine;
use sumi_harvest::output::{load_statistics, print_report, print_statistics};
use sumi_harvest::storage::open_storage;
use sumi_harvest::{Coordinator, HarvestError};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite bulk content downloader
///
/// Expands the given URLs through site crawlers and downloads every file
/// they find, skipping anything the history database says is already done.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A polite bulk content downloader", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to scrape
    #[arg(value_name = "URLS")]
    urls: Vec<String>,

    /// Read additional URLs from a file, one per line
    #[arg(short, long, value_name = "FILE")]
    input_file: Option<PathBuf>,

    /// Re-scrape the pages of downloads that never completed
    #[arg(long)]
    retry_failed: bool,

    /// Hash every file below a folder and exit
    #[arg(long, value_name = "DIR", conflicts_with_all = ["stats", "dry_run"])]
    hash_dir: Option<PathBuf>,

    /// Show statistics from the history database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "hash_dir"])]
    stats: bool,

    /// Scrape everything but download nothing
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.stats {
        return handle_stats(&config);
    }
    if let Some(dir) = &cli.hash_dir {
        return handle_hash_dir(&config, dir).await;
    }
    handle_run(config, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` wins over the flags when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "sumi_harvest=info,warn",
            1 => "sumi_harvest=debug,info",
            2 => "sumi_harvest=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.general.database_path.display());

    let storage = open_storage(&config.general.database_path)?;
    let stats = load_statistics(&*storage.lock())?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --hash-dir mode
async fn handle_hash_dir(config: &Config, dir: &Path) -> anyhow::Result<()> {
    let storage = open_storage(&config.general.database_path)?;
    let engine = HashEngine::from_config(storage, config);

    let hashed = engine.hash_directory(dir).await?;
    let stats = engine.stats();
    println!(
        "Hashed {} files in {} ({} computed, {} reused)",
        hashed,
        dir.display(),
        stats.computed,
        stats.reused
    );
    Ok(())
}

/// Handles a normal run
async fn handle_run(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let mut urls = cli.urls.clone();
    if let Some(path) = &cli.input_file {
        urls.extend(read_input_file(path)?);
    }
    if urls.is_empty() && !cli.retry_failed {
        anyhow::bail!("No URLs given; pass URLs, --input-file or --retry-failed");
    }

    let storage = open_storage(&config.general.database_path)
        .with_context(|| format!("Failed to open {}", config.general.database_path.display()))?;
    let registry = CrawlerRegistry::from_config(&config.crawlers);
    tracing::info!("{} crawlers registered", registry.len());

    let mut coordinator = Coordinator::new(config, registry, storage)?.with_dry_run(cli.dry_run);

    for url in &urls {
        if let Err(e) = coordinator.submit(url) {
            tracing::warn!("Ignoring input {}: {}", url, e);
        }
    }
    if cli.retry_failed {
        coordinator.retry_failed()?;
    }

    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    match coordinator.run().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(HarvestError::Cancelled) => {
            tracing::warn!("Run cancelled before completion");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Non-empty lines of an input file, skipping `#` comments
fn read_input_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

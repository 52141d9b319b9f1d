//! Sumi-Harvest: a polite bulk content downloader
//!
//! This crate turns a list of input URLs into deduplicated, resumable file
//! downloads. Site-specific crawlers expand pages into further scrape work and
//! downloadable media; the orchestration engine bounds that expansion, governs
//! request rates and concurrency per host, performs retried transfers and keeps
//! a persistent history so repeated runs never download the same file twice.

pub mod config;
pub mod crawler;
pub mod download;
pub mod hashing;
pub mod limiter;
pub mod output;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
///
/// Item-level failures (one URL failing to scrape or download) are not
/// represented here; they are recovered where they happen and reported
/// through the CSV logs. A `HarvestError` aborts the whole run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Run cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// How an item-level failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Dead link or refused content; never retried
    Permanent,
    /// Timeouts, resets and rate limiting; retried up to the attempt limit
    Transient,
    /// Local disk or permission trouble; only the affected item fails
    Resource,
    /// Corrupt partial file or checksum mismatch; restarted from zero once
    Integrity,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Transient => "transient",
            Self::Resource => "resource",
            Self::Integrity => "integrity",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, CrawlerRegistry, MediaItem, ScrapeItem, ScrapeItemKind};
pub use download::{DownloadManager, Outcome};
pub use scheduler::Coordinator;
pub use state::{DomainState, DownloadState};
pub use url::{extract_domain, normalize_input_url};

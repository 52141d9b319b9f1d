//! The crawler interface consumed by the scheduler

use crate::crawler::{ScrapeItem, ScrapeItemKind, ScrapeOutput};
use crate::download::classify_status;
use crate::limiter::Governor;
use crate::storage::{SharedStorage, Storage, StorageError};
use crate::url::sanitize_filename;
use crate::ErrorClass;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Why a crawler could not expand a scrape item
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Timed out")]
    Timeout,

    #[error("Could not parse {url}: {message}")]
    Parse { url: String, message: String },

    /// The history store failed; this one ends the run
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CrawlError {
    /// Transient errors are retried by the scheduler, the rest are logged
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http { status, .. } => classify_status(*status),
            Self::Request(_) | Self::Timeout => ErrorClass::Transient,
            Self::Parse { .. } => ErrorClass::Permanent,
            Self::Storage(_) => ErrorClass::Resource,
        }
    }

    /// Short label for the scrape error log
    pub fn reason(&self) -> String {
        match self {
            Self::Http { status, .. } => status.to_string(),
            Self::Request(_) => "Connection Error".to_string(),
            Self::Timeout => "Timeout".to_string(),
            Self::Parse { .. } => "Parse Error".to_string(),
            Self::Storage(_) => "Database Error".to_string(),
        }
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// What a crawler may use while scraping
///
/// Every request goes through the governor's request limiter.
pub struct CrawlerContext {
    client: Client,
    governor: Arc<Governor>,
    storage: SharedStorage,
    download_root: PathBuf,
    block_sub_folders: bool,
    ignore_history: bool,
}

impl CrawlerContext {
    pub fn new(
        client: Client,
        governor: Arc<Governor>,
        storage: SharedStorage,
        download_root: PathBuf,
        block_sub_folders: bool,
    ) -> Self {
        Self {
            client,
            governor,
            storage,
            download_root,
            block_sub_folders,
            ignore_history: false,
        }
    }

    /// Report every album as unknown, so nothing is skipped by history
    pub fn with_ignore_history(mut self, ignore_history: bool) -> Self {
        self.ignore_history = ignore_history;
        self
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Sends a rate limited GET request
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - A 2xx response
    /// * `Err(CrawlError::Http)` - Any other status; a 429 also marks the
    ///   host as rate limited
    pub async fn get(&self, url: &Url) -> Result<Response, CrawlError> {
        let host = url.host_str().unwrap_or_default();
        self.governor.acquire_request(host).await;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.governor.mark_rate_limited(host);
        }
        if !status.is_success() {
            return Err(CrawlError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Fetches a page body and the URL it was served from after redirects
    pub async fn get_text(&self, url: &Url) -> Result<(Url, String), CrawlError> {
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok((final_url, body))
    }

    /// Folder for an album or thread titled `title` on `domain`
    pub fn folder_for(&self, title: &str, domain: &str) -> PathBuf {
        let name = sanitize_filename(&format!("{} ({})", title.trim(), domain));
        self.download_root.join(name)
    }

    /// `base/name`, or `base` itself when sub folders are blocked
    pub fn sub_folder(&self, base: &Path, name: &str) -> PathBuf {
        if self.block_sub_folders {
            base.to_path_buf()
        } else {
            base.join(sanitize_filename(name))
        }
    }

    /// Completion flags of the files already known for an album, keyed by
    /// history path
    pub fn check_album(&self, domain: &str, album_id: &str) -> Result<HashMap<String, bool>, CrawlError> {
        if self.ignore_history {
            return Ok(HashMap::new());
        }
        let known = self.storage.lock().check_album(domain, album_id)?;
        Ok(known)
    }
}

/// A site-specific component that expands one scrape item
///
/// Children must be built with [`ScrapeItem::child`] and files with
/// [`MediaItem::new`](crate::crawler::MediaItem::new) so provenance and depth
/// stay correct.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Domain used for folder names and history keys
    fn domain(&self) -> &str;

    /// Kind of an input URL this crawler handles
    fn kind_of(&self, _url: &Url) -> ScrapeItemKind {
        ScrapeItemKind::Generic
    }

    async fn scrape(&self, item: &ScrapeItem, ctx: &CrawlerContext) -> Result<ScrapeOutput, CrawlError>;
}

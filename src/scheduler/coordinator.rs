//! Coordinator - main run orchestration logic
//!
//! This module contains the run loop that coordinates all aspects of a run,
//! including:
//! - Routing input URLs to crawlers
//! - Applying depth, thread depth and children limits to what they find
//! - Feeding media items to the Download Manager
//! - Handling cancellation
//! - Deferred hashing and deduplication once downloads drain

use crate::config::{Config, HashingMode};
use crate::crawler::{
    CrawlError, Crawler, CrawlerContext, CrawlerRegistry, MediaItem, ScrapeItem, ScrapeItemKind,
    ScrapeOutput,
};
use crate::download::{
    build_download_client, build_http_client, CompletedDownload, DownloadManager, DownloadSettings,
    FreeSpaceSource, Outcome, SkipReason,
};
use crate::hashing::{Deduplicator, FileMeta, HashEngine};
use crate::limiter::Governor;
use crate::output::{CsvLogs, RunReport};
use crate::scheduler::{ChildCategory, ExpansionContext, Route, ScrapeMapper};
use crate::storage::{SharedStorage, Storage};
use crate::url::{normalize_input_url, referer_key};
use crate::{HarvestError, UrlResult};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;
use walkdir::WalkDir;

/// Stops a running coordinator from another task
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A finished unit of work
enum TaskResult {
    Scraped {
        item: ScrapeItem,
        attempt: u32,
        result: Result<ScrapeOutput, CrawlError>,
    },
    Downloaded {
        item: MediaItem,
        outcome: Result<Outcome, HarvestError>,
    },
}

/// Main run coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: SharedStorage,
    governor: Arc<Governor>,
    mapper: ScrapeMapper,
    crawler_ctx: Arc<CrawlerContext>,
    download_client: Client,
    logs: Arc<CsvLogs>,
    hasher: Option<Arc<HashEngine>>,
    free_space: Option<Arc<dyn FreeSpaceSource>>,
    events: Option<mpsc::UnboundedSender<CompletedDownload>>,
    retry_backoff: Duration,
    dry_run: bool,
    cancel: CancelHandle,
    roots: Vec<ScrapeItem>,
    contexts: HashMap<Url, ExpansionContext>,
    completed: Vec<CompletedDownload>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `registry` - Crawlers available for this run
    /// * `storage` - The history store shared with every task
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Failed to build the HTTP clients
    pub fn new(config: Config, registry: CrawlerRegistry, storage: SharedStorage) -> Result<Self, HarvestError> {
        let governor = Arc::new(Governor::new(&config.rate_limiting));
        let page_client = build_http_client(&config.general, &config.rate_limiting)?;
        let download_client = build_download_client(&config.general, &config.rate_limiting)?;

        let crawler_ctx = Arc::new(CrawlerContext::new(
            page_client,
            Arc::clone(&governor),
            Arc::clone(&storage),
            config.general.download_folder.clone(),
            config.download_options.block_download_sub_folders,
        )
        .with_ignore_history(config.download_options.ignore_history));

        let hasher = HashEngine::is_enabled(&config)
            .then(|| Arc::new(HashEngine::from_config(Arc::clone(&storage), &config)));

        let (tx, _) = watch::channel(false);

        Ok(Self {
            mapper: ScrapeMapper::new(registry, &config),
            logs: Arc::new(CsvLogs::new(&config.general.log_folder)),
            config: Arc::new(config),
            storage,
            governor,
            crawler_ctx,
            download_client,
            hasher,
            free_space: None,
            events: None,
            retry_backoff: Duration::from_secs(1),
            dry_run: false,
            cancel: CancelHandle { tx: Arc::new(tx) },
            roots: Vec::new(),
            contexts: HashMap::new(),
            completed: Vec::new(),
        })
    }

    pub fn with_free_space_source(mut self, source: Arc<dyn FreeSpaceSource>) -> Self {
        self.free_space = Some(source);
        self
    }

    /// Publish completed downloads on `events` as they finish
    pub fn with_events(mut self, events: mpsc::UnboundedSender<CompletedDownload>) -> Self {
        self.events = Some(events);
        self
    }

    /// Pause between two attempts of a failed scrape or download
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Scrape everything but download nothing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn logs(&self) -> &CsvLogs {
        &self.logs
    }

    /// Queues an input URL as a depth 0 scrape item
    pub fn submit(&mut self, url: &str) -> UrlResult<()> {
        let url = normalize_input_url(url)?;
        let mut item = ScrapeItem::root(url);
        if let Some(crawler) = self.mapper.registry().resolve(&item.url) {
            item.kind = crawler.kind_of(&item.url);
        }
        self.submit_item(item);
        Ok(())
    }

    /// Queues a prepared root item
    pub fn submit_item(&mut self, item: ScrapeItem) {
        debug!("Submitted {} ({})", item.url, item.kind.as_str());
        self.roots.push(item);
    }

    /// Queues the referer of every download that never completed
    ///
    /// # Returns
    ///
    /// The number of pages queued
    pub fn retry_failed(&mut self) -> Result<usize, HarvestError> {
        let failed = self.storage.lock().get_failed_items()?;
        let mut queued = 0;
        let mut seen = std::collections::HashSet::new();
        for record in failed {
            if !seen.insert(record.referer.clone()) {
                continue;
            }
            match self.submit(&record.referer) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Cannot retry {}: {}", record.referer, e),
            }
        }
        info!("Retrying {} pages with failed downloads", queued);
        Ok(queued)
    }

    fn download_manager(&self) -> DownloadManager {
        let mut settings = DownloadSettings::from_config(&self.config);
        settings.retry_backoff = self.retry_backoff;

        let mut manager = DownloadManager::new(
            self.download_client.clone(),
            Arc::clone(&self.governor),
            Arc::clone(&self.storage),
            settings,
        );
        if let Some(source) = &self.free_space {
            manager = manager.with_free_space_source(Arc::clone(source));
        }
        if let Some(events) = &self.events {
            manager = manager.with_events(events.clone());
        }
        if self.config.dupe_cleanup.hashing == HashingMode::InPlace {
            if let Some(hasher) = &self.hasher {
                manager = manager.with_hash_engine(Arc::clone(hasher));
            }
        }
        manager
    }

    /// Runs every submitted URL to completion
    ///
    /// Item failures are logged and counted; only a failing history store
    /// or cancellation ends the run early.
    pub async fn run(&mut self) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let mut report = RunReport::default();
        let mut cancelled = self.cancel.tx.subscribe();
        if *cancelled.borrow_and_update() {
            return Err(HarvestError::Cancelled);
        }

        info!("Starting run with {} input URLs", self.roots.len());
        self.storage.lock().purge_session_referers()?;

        let downloads = Arc::new(self.download_manager());
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();

        for item in std::mem::take(&mut self.roots) {
            self.contexts.entry(item.url.clone()).or_default();
            self.route(item, &mut tasks, &downloads, &mut report)?;
        }

        loop {
            let next = tokio::select! {
                joined = tasks.join_next() => Some(joined),
                _ = cancelled.changed() => None,
            };
            let Some(joined) = next else {
                self.shutdown(&mut tasks).await;
                return Err(HarvestError::Cancelled);
            };
            let Some(joined) = joined else {
                break;
            };

            match joined? {
                TaskResult::Scraped { item, attempt, result } => {
                    self.handle_scrape(item, attempt, result, &mut tasks, &downloads, &mut report)?;
                }
                TaskResult::Downloaded { item, outcome } => {
                    let outcome = outcome?;
                    self.handle_outcome(&item, &outcome);
                    report.record_outcome(&outcome);
                }
            }
        }

        self.post_process(&mut report).await?;

        report.truncated += self.contexts.values().map(|c| c.dropped()).sum::<u64>();
        report.rate_limited_sites = self.governor.rate_limited_sites();
        report.elapsed = started.elapsed();
        info!(
            "Run finished: {} completed, {} skipped, {} failed in {:?}",
            report.completed,
            report.total_skipped(),
            report.total_failed(),
            report.elapsed
        );
        Ok(report)
    }

    /// Sends one scrape item where it belongs
    fn route(
        &mut self,
        item: ScrapeItem,
        tasks: &mut JoinSet<TaskResult>,
        downloads: &Arc<DownloadManager>,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        match self.mapper.route(item) {
            Route::Crawl(crawler, item) => {
                self.spawn_scrape(crawler, item, 1, tasks);
            }
            Route::Direct(media) => {
                self.dispatch_media(media, tasks, downloads, report)?;
            }
            Route::Unsupported(item) => {
                debug!("Unsupported URL {}", item.url);
                self.logs.unsupported(&item.url, item.origin());
                report.unsupported += 1;
            }
            Route::Filtered(reason) => {
                debug!("Not scraping: {}", reason);
            }
        }
        Ok(())
    }

    fn spawn_scrape(
        &self,
        crawler: Arc<dyn Crawler>,
        item: ScrapeItem,
        attempt: u32,
        tasks: &mut JoinSet<TaskResult>,
    ) {
        let ctx = Arc::clone(&self.crawler_ctx);
        let backoff = self.retry_backoff * attempt.saturating_sub(1);
        tasks.spawn(async move {
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            debug!("{} scraping {}", crawler.name(), item.url);
            let result = crawler.scrape(&item, &ctx).await;
            TaskResult::Scraped { item, attempt, result }
        });
    }

    fn handle_scrape(
        &mut self,
        item: ScrapeItem,
        attempt: u32,
        result: Result<ScrapeOutput, CrawlError>,
        tasks: &mut JoinSet<TaskResult>,
        downloads: &Arc<DownloadManager>,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        let output = match result {
            Ok(output) => output,
            Err(CrawlError::Storage(e)) => return Err(e.into()),
            Err(e) => {
                let attempts = self.config.rate_limiting.download_attempts.max(1);
                if e.class() == crate::ErrorClass::Transient && attempt < attempts {
                    if let Some(crawler) = self.mapper.registry().resolve(&item.url) {
                        debug!("Scrape of {} failed ({}), retrying", item.url, e);
                        self.spawn_scrape(crawler, item, attempt + 1, tasks);
                        return Ok(());
                    }
                }
                warn!("Scrape of {} failed: {}", item.url, e);
                self.logs
                    .scrape_error(&item.url, &e.reason(), &item.parents, item.origin());
                report.record_scrape_failure(&e.reason());
                return Ok(());
            }
        };

        self.expand(item, output, tasks, downloads, report)
    }

    /// Applies the expansion limits to what a crawler found
    fn expand(
        &mut self,
        item: ScrapeItem,
        output: ScrapeOutput,
        tasks: &mut JoinSet<TaskResult>,
        downloads: &Arc<DownloadManager>,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        if let Some(post) = &output.last_post {
            self.logs.last_post(post);
        }
        report.record_previously_completed(u64::from(output.previously_completed));

        let options = &self.config.download_options;
        let limit = item
            .children_limit
            .or_else(|| item.kind.limit_index().and_then(|i| options.children_limit(i)));
        let max_depth = options.maximum_scrape_depth;
        let max_thread_depth = options.maximum_thread_depth as usize;

        let origin = item.origin().clone();
        let mut admitted_children = Vec::new();
        let mut admitted_media = Vec::new();
        {
            let ctx = self.contexts.entry(origin).or_default();

            for child in output.children {
                if child.depth > max_depth {
                    debug!("Dropping {}: depth {} over {}", child.url, child.depth, max_depth);
                    report.truncated += 1;
                    continue;
                }
                if child.kind == ScrapeItemKind::Forum && child.thread_depth() > max_thread_depth {
                    debug!("Dropping nested thread {}", child.url);
                    report.truncated += 1;
                    continue;
                }
                if ctx.admit_child(&item.url, ChildCategory::Scrape(child.kind), limit) {
                    admitted_children.push(child);
                }
            }

            for media in output.media {
                if ctx.admit_child(&item.url, ChildCategory::Media, limit) {
                    admitted_media.push(media);
                }
            }
        }

        for child in admitted_children {
            self.route(child, tasks, downloads, report)?;
        }
        for media in admitted_media {
            self.dispatch_media(media, tasks, downloads, report)?;
        }
        Ok(())
    }

    /// Starts a download unless the referer was seen on an earlier run
    fn dispatch_media(
        &mut self,
        media: MediaItem,
        tasks: &mut JoinSet<TaskResult>,
        downloads: &Arc<DownloadManager>,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        if self.config.download_options.skip_referer_seen_before && self.referer_seen_before(&media.referer)? {
            debug!("Skipping {}: referer {} seen before", media.url, media.referer);
            report.record_outcome(&Outcome::Skipped(SkipReason::RefererSeen));
            return Ok(());
        }

        if self.dry_run {
            info!("Would download {} to {}", media.url, media.complete_path().display());
            report.planned += 1;
            return Ok(());
        }

        let downloads = Arc::clone(downloads);
        tasks.spawn(async move {
            let outcome = downloads.download(&media).await;
            TaskResult::Downloaded { item: media, outcome }
        });
        Ok(())
    }

    /// True when the referer has history from a previous run
    ///
    /// The first sighting in this run is remembered, so later files from the
    /// same page are not skipped because of rows this run wrote.
    fn referer_seen_before(&self, referer: &Url) -> Result<bool, HarvestError> {
        let key = referer_key(referer);
        let mut storage = self.storage.lock();
        if storage.is_session_referer(&key)? {
            return Ok(false);
        }
        if storage.referer_seen(&key)? {
            return Ok(true);
        }
        storage.record_session_referer(&key)?;
        Ok(false)
    }

    fn handle_outcome(&mut self, item: &MediaItem, outcome: &Outcome) {
        match outcome {
            Outcome::Completed(done) => self.completed.push(done.clone()),
            Outcome::RetryableFailure(e) | Outcome::PermanentFailure(e) => {
                self.logs.download_error(
                    &item.url,
                    &e.reason(),
                    &item.referer,
                    &item.parents,
                    item.origin(),
                );
            }
            Outcome::Skipped(reason) => {
                debug!("Skipped {}: {}", item.url, reason.as_str());
            }
        }
    }

    /// Deferred hashing, then the dedup pass
    async fn post_process(&mut self, report: &mut RunReport) -> Result<(), HarvestError> {
        let Some(hasher) = self.hasher.clone() else {
            return Ok(());
        };

        if self.config.dupe_cleanup.hashing == HashingMode::PostDownload {
            info!("Hashing {} downloaded files", self.completed.len());
            for done in &self.completed {
                let meta = FileMeta {
                    original_filename: done.path.file_name().map(|n| n.to_string_lossy().into_owned()),
                    referer: Some(referer_key(&done.referer)),
                    downloaded_at: done.started_at,
                };
                hasher.hash_file(&done.path, &meta).await?;
            }
        }
        report.hashes = hasher.stats();

        if self.config.dupe_cleanup.auto_dedupe {
            let dedup = Deduplicator::new(
                Arc::clone(&self.storage),
                self.config.dupe_cleanup.retention,
                self.config.dupe_cleanup.send_deleted_to_trash,
            );
            let result = dedup.run().await?;
            for removal in &result.removed {
                self.logs.dedupe(&removal.kept, &removal.digest, &removal.removed);
            }
            report.dedup_removed = result.removed.len() as u64;
        }
        Ok(())
    }

    /// Stops every task and releases the limiter
    async fn shutdown(&self, tasks: &mut JoinSet<TaskResult>) {
        warn!("Run cancelled, stopping {} tasks", tasks.len());
        self.governor.close();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        if self.config.general.delete_partial_files_on_cancel {
            let folder = self.config.general.download_folder.clone();
            match tokio::task::spawn_blocking(move || delete_partial_files(&folder)).await {
                Ok(removed) => info!("Deleted {} partial files", removed),
                Err(e) => error!("Partial file cleanup failed: {}", e),
            }
        }
    }
}

/// Removes every `.part` file below `folder`
fn delete_partial_files(folder: &Path) -> usize {
    WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "part"))
        .filter(|entry| std::fs::remove_file(entry.path()).is_ok())
        .count()
}

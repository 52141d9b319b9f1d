//! Download Manager
//!
//! Performs one resumable file transfer per media item:
//!
//! 1. History, known-bad URL and file type checks (no network I/O)
//! 2. Free space check, then a governor slot for the destination
//! 3. Optional HEAD request when size limits apply and the size is unknown
//! 4. Transfer into `<file>.part`, resuming an existing one with `Range`
//! 5. Rename to the final path, history write, in-place hashing
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | 404, 410, other permanent statuses | Fail permanently, never retried |
//! | 429 | Host marked rate limited, retried |
//! | 5xx, timeout, reset, slow link, empty body | Retried up to the attempt limit |
//! | 416 or checksum mismatch | `.part` discarded, restarted once for free |
//! | Low disk space, IO error | Item fails, the run goes on |

use crate::config::{Config, FileSizeLimits, IgnoreOptions};
use crate::crawler::MediaItem;
use crate::download::{
    check_allowed_filetype, check_filesize_limits, has_size_limits, CompletedDownload,
    DownloadError, FreeSpaceSource, MediaKind, Outcome, SkipReason, SystemFreeSpace,
    TEXT_EXTENSIONS,
};
use crate::hashing::{digest_file, FileMeta, HashAlgorithm, HashEngine};
use crate::limiter::Governor;
use crate::state::DownloadState;
use crate::storage::{HistoryRecord, SharedStorage, Storage};
use crate::url::{history_path, iterate_filename, referer_key};
use crate::{ErrorClass, HarvestError};
use chrono::Utc;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE, REFERER};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Placeholder files some hosts serve in place of removed content,
/// with the status they stand for
pub const KNOWN_BAD_URLS: &[(&str, u16)] = &[
    ("https://i.imgur.com/removed.png", 404),
    ("https://saint2.su/assets/notfound.gif", 404),
    ("https://bnkr.b-cdn.net/maintenance-vid.mp4", 503),
    ("https://bnkr.b-cdn.net/maintenance.mp4", 503),
    ("https://c.bunkr-cache.se/maintenance-vid.mp4", 503),
    ("https://c.bunkr-cache.se/maintenance.jpg", 503),
];

/// Free space is re-checked every this many chunks
const FREE_SPACE_CHECK_INTERVAL: u64 = 5;

/// Download Manager settings taken from the configuration
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// `None` retries transient failures forever
    pub attempt_limit: Option<u32>,
    pub required_free_space: u64,
    /// Bytes per second, 0 disables the slow link check
    pub slow_download_speed: u64,
    pub slow_download_window: Duration,
    pub read_timeout: Duration,
    /// Pause between two attempts of the same item
    pub retry_backoff: Duration,
    pub ignore_history: bool,
    pub mark_completed_only: bool,
    pub ignore: IgnoreOptions,
    pub size_limits: FileSizeLimits,
}

impl DownloadSettings {
    pub fn from_config(config: &Config) -> Self {
        let rate = &config.rate_limiting;
        Self {
            attempt_limit: rate.attempt_limit(),
            required_free_space: config.general.required_free_space(),
            slow_download_speed: rate.slow_download_speed,
            slow_download_window: Duration::from_secs(rate.slow_download_window),
            read_timeout: Duration::from_secs(rate.read_timeout),
            retry_backoff: Duration::from_secs(1),
            ignore_history: config.download_options.ignore_history,
            mark_completed_only: config.download_options.skip_download_mark_completed,
            ignore: config.ignore_options.clone(),
            size_limits: config.file_size_limits.clone(),
        }
    }
}

/// A failed attempt and whether it appended to an existing `.part`
struct AttemptError {
    error: DownloadError,
    resumed: bool,
}

impl From<DownloadError> for AttemptError {
    fn from(error: DownloadError) -> Self {
        Self {
            error,
            resumed: false,
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::from(e).into()
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        DownloadError::from(e).into()
    }
}

/// Detects transfers that stay below the speed floor for too long
#[derive(Debug)]
struct SpeedCheck {
    floor: u64,
    window: Duration,
    sample_start: Instant,
    sample_bytes: u64,
    slow_since: Option<Instant>,
}

impl SpeedCheck {
    fn new(floor: u64, window: Duration, now: Instant) -> Self {
        Self {
            floor,
            window,
            sample_start: now,
            sample_bytes: 0,
            slow_since: None,
        }
    }

    /// Accounts for `bytes` received at `now`
    fn record(&mut self, bytes: u64, now: Instant) -> Result<(), DownloadError> {
        if self.floor == 0 {
            return Ok(());
        }

        self.sample_bytes += bytes;
        let elapsed = now.saturating_duration_since(self.sample_start);
        if elapsed < Duration::from_secs(1) {
            return Ok(());
        }

        let speed = self.sample_bytes as f64 / elapsed.as_secs_f64();
        let started = self.sample_start;
        self.sample_start = now;
        self.sample_bytes = 0;

        if speed > self.floor as f64 {
            self.slow_since = None;
            return Ok(());
        }

        // the link has been slow since the sample began, not since it ended
        let since = *self.slow_since.get_or_insert(started);
        if now.saturating_duration_since(since) >= self.window {
            return Err(DownloadError::SlowDownload {
                floor: self.floor,
                window: self.window.as_secs(),
            });
        }
        Ok(())
    }
}

/// Performs retried, resumable transfers of media items
pub struct DownloadManager {
    client: Client,
    governor: Arc<Governor>,
    storage: SharedStorage,
    settings: DownloadSettings,
    free_space: Arc<dyn FreeSpaceSource>,
    hasher: Option<Arc<HashEngine>>,
    events: Option<mpsc::UnboundedSender<CompletedDownload>>,
}

impl DownloadManager {
    pub fn new(
        client: Client,
        governor: Arc<Governor>,
        storage: SharedStorage,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            client,
            governor,
            storage,
            settings,
            free_space: Arc::new(SystemFreeSpace::new()),
            hasher: None,
            events: None,
        }
    }

    /// Hash every completed file before releasing its slot
    pub fn with_hash_engine(mut self, hasher: Arc<HashEngine>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn with_free_space_source(mut self, source: Arc<dyn FreeSpaceSource>) -> Self {
        self.free_space = source;
        self
    }

    /// Publish every completed download on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<CompletedDownload>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Downloads one media item
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome)` - What happened to the item; item failures land here
    /// * `Err(HarvestError::Storage)` - The history store failed
    /// * `Err(HarvestError::Cancelled)` - The governor was closed while waiting
    pub async fn download(&self, item: &MediaItem) -> Result<Outcome, HarvestError> {
        let mut state = DownloadState::Queued;
        let url_path = history_path(&item.url);
        let host = item.url.host_str().unwrap_or_default().to_string();

        if self.already_downloaded(item, &url_path)? {
            advance(&mut state, DownloadState::Skipped, &item.url);
            return Ok(Outcome::Skipped(SkipReason::AlreadyDownloaded));
        }

        if let Some(status) = known_bad_status(&item.url) {
            advance(&mut state, DownloadState::FailedPermanent, &item.url);
            return Ok(Outcome::PermanentFailure(DownloadError::KnownBadUrl(status)));
        }

        let kind = MediaKind::from_extension(item.ext.as_deref());
        if !check_allowed_filetype(kind, &self.settings.ignore) {
            advance(&mut state, DownloadState::Skipped, &item.url);
            return Ok(Outcome::Skipped(SkipReason::ExcludedFileType));
        }

        let record = self.history_record(item, &item.complete_path(), &url_path);
        if self.settings.mark_completed_only {
            self.storage.lock().mark_complete(&record, 0)?;
            advance(&mut state, DownloadState::Skipped, &item.url);
            return Ok(Outcome::Skipped(SkipReason::MarkedCompleted));
        }
        self.storage.lock().insert_incomplete(&record)?;

        if let Err(error) = self.check_free_space(&item.download_folder) {
            warn!("Not downloading {}: {}", item.url, error);
            advance(&mut state, DownloadState::FailedRetryable, &item.url);
            return Ok(Outcome::failed(error));
        }

        let slot = self
            .governor
            .acquire_download(&host, &item.complete_path())
            .await
            .map_err(|_| HarvestError::Cancelled)?;
        trace!("Slot on {} taken for {}", slot.site(), item.url);

        // another task may have finished the same file while this one waited
        if self.already_downloaded(item, &url_path)? {
            advance(&mut state, DownloadState::Skipped, &item.url);
            return Ok(Outcome::Skipped(SkipReason::AlreadyDownloaded));
        }

        if has_size_limits(kind, &self.settings.size_limits) {
            let size = match item.expected_size {
                Some(size) => Some(size),
                None => self.fetch_size(item, &host).await,
            };
            if let Some(size) = size {
                if !check_filesize_limits(kind, size, &self.settings.size_limits) {
                    debug!("Skipping {}: {} bytes is outside the size limits", item.url, size);
                    advance(&mut state, DownloadState::Skipped, &item.url);
                    return Ok(Outcome::Skipped(SkipReason::SizeLimit));
                }
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(&item.download_folder).await {
            advance(&mut state, DownloadState::FailedRetryable, &item.url);
            return Ok(Outcome::failed(e.into()));
        }

        let (destination, _renamed_guard) = self.claim_destination(item).await;
        let record = self.history_record(item, &destination, &url_path);
        let part = MediaItem::part_path_for(&destination);

        let started_at = Utc::now();
        let size = match self.transfer(item, &host, &part, &mut state).await {
            Ok(size) => size,
            Err(error) => {
                warn!("Download of {} failed: {}", item.url, error);
                return Ok(Outcome::failed(error));
            }
        };

        if let Err(e) = tokio::fs::rename(&part, &destination).await {
            advance(&mut state, DownloadState::FailedRetryable, &item.url);
            return Ok(Outcome::failed(e.into()));
        }
        self.storage.lock().mark_complete(&record, size)?;
        advance(&mut state, DownloadState::Completed, &item.url);

        let hash = match &self.hasher {
            Some(hasher) => {
                let meta = FileMeta {
                    original_filename: Some(item.original_filename.clone()),
                    referer: Some(referer_key(&item.referer)),
                    downloaded_at: started_at,
                };
                hasher.hash_file(&destination, &meta).await?
            }
            None => None,
        };

        let completed = CompletedDownload {
            url: item.url.clone(),
            referer: item.referer.clone(),
            origin: item.origin().clone(),
            parents: item.parents.clone(),
            path: destination.clone(),
            size,
            hash,
            started_at,
            finished_at: Utc::now(),
        };
        if let Some(events) = &self.events {
            // a dropped receiver only means nobody listens any more
            let _ = events.send(completed.clone());
        }

        info!("Downloaded {} ({} bytes)", destination.display(), size);
        drop(slot);
        Ok(Outcome::Completed(completed))
    }

    fn already_downloaded(&self, item: &MediaItem, url_path: &str) -> Result<bool, HarvestError> {
        if self.settings.ignore_history {
            return Ok(false);
        }
        Ok(self.storage.lock().check_complete(&item.domain, url_path)?)
    }

    fn history_record(&self, item: &MediaItem, destination: &Path, url_path: &str) -> HistoryRecord {
        let folder = destination.parent().unwrap_or(&item.download_folder);
        let filename = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.filename.clone());

        HistoryRecord {
            domain: item.domain.clone(),
            url_path: url_path.to_string(),
            referer: referer_key(&item.referer),
            album_id: item.album_id.clone(),
            download_path: folder.to_string_lossy().into_owned(),
            download_filename: filename,
            original_filename: item.original_filename.clone(),
            completed: false,
            created_at: Utc::now().to_rfc3339(),
            completed_at: None,
            file_size: item.expected_size,
            duration: item.duration,
        }
    }

    fn check_free_space(&self, folder: &Path) -> Result<(), DownloadError> {
        let required = self.settings.required_free_space;
        if required == 0 {
            return Ok(());
        }
        match self.free_space.available_space(folder) {
            Some(available) if available < required => {
                Err(DownloadError::InsufficientFreeSpace { required, available })
            }
            _ => Ok(()),
        }
    }

    /// Final path for the item, moving to `name (n).ext` while taken
    ///
    /// The slot already owns the item's own path; any replacement path is
    /// locked too and the guard is returned with it.
    async fn claim_destination(&self, item: &MediaItem) -> (PathBuf, Option<OwnedMutexGuard<()>>) {
        let mut destination = item.complete_path();
        let mut guard = None;
        while destination.exists() {
            destination = iterate_filename(&destination);
            guard = Some(self.governor.lock_destination(&destination).await);
        }
        if destination != item.complete_path() {
            debug!("{} exists, saving as {}", item.filename, destination.display());
        }
        (destination, guard)
    }

    /// Size announced by a HEAD request, if any
    async fn fetch_size(&self, item: &MediaItem, host: &str) -> Option<u64> {
        self.governor.acquire_request(host).await;
        let response = self
            .client
            .head(item.url.clone())
            .header(REFERER, item.referer.as_str())
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Runs attempts until one succeeds or the failure is final
    async fn transfer(
        &self,
        item: &MediaItem,
        host: &str,
        part: &Path,
        state: &mut DownloadState,
    ) -> Result<u64, DownloadError> {
        let mut attempts = 0u32;
        let mut restarted = false;
        let mut first = true;
        // largest `.part` seen so far; only growth past it earns a fresh budget
        let mut high_water = part_len(part).await;

        loop {
            if !first {
                self.governor.acquire_request(host).await;
            }
            first = false;
            attempts += 1;
            advance(state, DownloadState::Connecting, &item.url);

            let AttemptError { error, resumed } = match self.attempt(item, part, state).await {
                Ok(size) => return Ok(size),
                Err(e) => e,
            };

            match error.class() {
                ErrorClass::Permanent => {
                    advance(state, DownloadState::FailedPermanent, &item.url);
                    return Err(error);
                }
                ErrorClass::Resource => {
                    advance(state, DownloadState::FailedRetryable, &item.url);
                    return Err(error);
                }
                ErrorClass::Integrity => {
                    remove_part(part).await;
                    high_water = 0;
                    if !restarted {
                        restarted = true;
                        warn!("{} for {}, restarting from zero", error, item.url);
                        advance(state, DownloadState::FailedRetryable, &item.url);
                        advance(state, DownloadState::Queued, &item.url);
                        attempts -= 1;
                        continue;
                    }
                }
                ErrorClass::Transient => {}
            }

            advance(state, DownloadState::FailedRetryable, &item.url);
            if error == DownloadError::RateLimited {
                self.governor.mark_rate_limited(host);
            }

            let length = part_len(part).await;
            let grew = length > high_water;
            high_water = high_water.max(length);

            if let Some(limit) = self.settings.attempt_limit {
                let slow = matches!(error, DownloadError::SlowDownload { .. });
                if resumed && grew && !slow {
                    // the next attempt resumes further along, so it starts a fresh budget
                    attempts = 0;
                } else if attempts >= limit {
                    return Err(error);
                }
            }

            debug!(
                "Attempt {} of {} failed: {}, retrying",
                attempts, item.url, error
            );
            advance(state, DownloadState::Queued, &item.url);
            if !self.settings.retry_backoff.is_zero() {
                tokio::time::sleep(self.settings.retry_backoff).await;
            }
        }
    }

    /// One request and body transfer into `part`
    async fn attempt(
        &self,
        item: &MediaItem,
        part: &Path,
        state: &mut DownloadState,
    ) -> Result<u64, AttemptError> {
        self.check_free_space(&item.download_folder)?;

        let resume_from = part_len(part).await;
        let mut request = self
            .client
            .get(item.url.clone())
            .header(REFERER, item.referer.as_str());
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={}-", resume_from));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(DownloadError::RangeNotSatisfiable.into());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DownloadError::RateLimited.into());
        }
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            }
            .into());
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if is_text_content(content_type) && !is_text_extension(item.ext.as_deref()) {
                return Err(DownloadError::InvalidContentType(content_type.to_string()).into());
            }
        }

        let append = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resume_from > 0 && !append {
            debug!("No range support for {}, restarting from zero", item.url);
        }
        let mut file = if append {
            OpenOptions::new().append(true).open(part).await?
        } else {
            File::create(part).await?
        };

        advance(state, DownloadState::Transferring, &item.url);
        let mut written = 0u64;
        let streamed = self.stream_body(response, &mut file, item, &mut written).await;
        let flushed = file.flush().await;
        drop(file);

        if let Err(error) = streamed {
            return Err(AttemptError { error, resumed: append });
        }
        if let Err(e) = flushed {
            return Err(AttemptError {
                error: e.into(),
                resumed: append,
            });
        }

        let size = if append { resume_from + written } else { written };
        if size == 0 {
            remove_part(part).await;
            return Err(DownloadError::EmptyBody.into());
        }

        if let Some(expected) = &item.expected_sha256 {
            let path = part.to_path_buf();
            let actual = tokio::task::spawn_blocking(move || digest_file(&path, HashAlgorithm::Sha256))
                .await
                .map_err(|e| DownloadError::Io(e.to_string()))??;
            if &actual != expected {
                return Err(DownloadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
        }

        Ok(size)
    }

    async fn stream_body(
        &self,
        response: Response,
        file: &mut File,
        item: &MediaItem,
        written: &mut u64,
    ) -> Result<(), DownloadError> {
        let mut stream = response.bytes_stream();
        let mut chunks = 0u64;
        let mut speed = SpeedCheck::new(
            self.settings.slow_download_speed,
            self.settings.slow_download_window,
            Instant::now(),
        );

        loop {
            let next = tokio::time::timeout(self.settings.read_timeout, stream.next())
                .await
                .map_err(|_| DownloadError::Timeout)?;
            let Some(chunk) = next else {
                return Ok(());
            };
            let chunk = chunk?;

            file.write_all(&chunk).await?;
            *written += chunk.len() as u64;
            chunks += 1;

            if chunks % FREE_SPACE_CHECK_INTERVAL == 0 {
                self.check_free_space(&item.download_folder)?;
            }
            speed.record(chunk.len() as u64, Instant::now())?;
        }
    }
}

fn advance(state: &mut DownloadState, next: DownloadState, url: &Url) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid transition {} -> {}",
        state,
        next
    );
    trace!("{}: {} -> {}", url, state, next);
    *state = next;
}

async fn part_len(part: &Path) -> u64 {
    tokio::fs::metadata(part).await.map(|m| m.len()).unwrap_or(0)
}

async fn remove_part(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Unable to remove {}: {}", part.display(), e);
        }
    }
}

/// Status a known placeholder URL stands for
fn known_bad_status(url: &Url) -> Option<u16> {
    KNOWN_BAD_URLS
        .iter()
        .find(|(bad, _)| *bad == url.as_str())
        .map(|(_, status)| *status)
}

fn is_text_content(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("text/html") || content_type.starts_with("text/plain")
}

fn is_text_extension(ext: Option<&str>) -> bool {
    ext.is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

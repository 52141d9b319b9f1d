//! Concurrency governor
//!
//! Bounds outstanding work globally and per host. A download start must pass,
//! in order:
//!
//! 1. the per-site download semaphore
//! 2. the global download semaphore
//! 3. the destination lock
//! 4. the per-site spacing delay (plus jitter)
//! 5. the global and per-site request limiters
//!
//! Everything acquired is owned by the returned [`DownloadSlot`]; dropping it
//! on any path (success, error, task abort) releases each part exactly once.

use crate::config::RateLimitingConfig;
use crate::limiter::FileLocks;
use crate::state::DomainState;
use crate::url::site_key_for;
use dashmap::DashMap;
use ::governor::clock::DefaultClock;
use ::governor::state::{InMemoryState, NotKeyed};
use ::governor::{Quota, RateLimiter};
use rand::Rng;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Hard caps on simultaneous downloads for hosts known to refuse more
pub const HOST_DOWNLOAD_CAPS: &[(&str, u32)] = &[
    ("bunkr", 1),
    ("bunkrr", 1),
    ("cyberdrop", 1),
    ("cyberfile", 1),
    ("pixeldrain", 2),
    ("xxxbunker", 2),
];

/// Request rates `(site, requests, period seconds)`
pub const HOST_REQUEST_RATES: &[(&str, u32, u64)] = &[
    ("bunkrr", 5, 1),
    ("cyberdrop", 5, 1),
    ("coomer", 1, 1),
    ("kemono", 1, 1),
    ("pixeldrain", 10, 1),
    ("gofile", 100, 60),
];

/// Request rate for sites without an entry above
pub const DEFAULT_HOST_REQUEST_RATE: u32 = 25;

/// Minimum seconds between two download starts on the same site
pub const HOST_SPACING: &[(&str, f64)] = &[
    ("bunkr", 0.5),
    ("bunkrr", 0.5),
    ("cyberdrop", 0.0),
    ("cyberfile", 0.0),
    ("pixeldrain", 0.0),
    ("coomer", 0.5),
    ("kemono", 0.5),
    ("nhentai.net", 1.0),
];

pub const DEFAULT_HOST_SPACING: f64 = 0.1;

/// Proof that a download may run; releases everything on drop
#[derive(Debug)]
pub struct DownloadSlot {
    site: String,
    _file: OwnedMutexGuard<()>,
    _global: OwnedSemaphorePermit,
    _site: OwnedSemaphorePermit,
}

impl DownloadSlot {
    /// Site key the slot was taken for
    pub fn site(&self) -> &str {
        &self.site
    }
}

/// Rate limiter and concurrency governor shared by all tasks of a run
#[derive(Debug)]
pub struct Governor {
    global_requests: Limiter,
    site_requests: DashMap<String, Arc<Limiter>>,
    downloads: Arc<Semaphore>,
    site_downloads: DashMap<String, Arc<Semaphore>>,
    domain_states: parking_lot::Mutex<HashMap<String, DomainState>>,
    file_locks: FileLocks,
    per_site_limit: u32,
    download_delay: Duration,
    jitter: f64,
}

impl Governor {
    /// Creates a governor from the rate limiting configuration
    pub fn new(config: &RateLimitingConfig) -> Self {
        Self {
            global_requests: request_limiter(config.rate_limit, Duration::from_secs(1)),
            site_requests: DashMap::new(),
            downloads: Arc::new(Semaphore::new(config.max_simultaneous_downloads as usize)),
            site_downloads: DashMap::new(),
            domain_states: parking_lot::Mutex::new(HashMap::new()),
            file_locks: FileLocks::new(),
            per_site_limit: config.max_simultaneous_downloads_per_domain,
            download_delay: Duration::from_secs_f64(config.download_delay),
            jitter: config.jitter,
        }
    }

    /// Maps a host to the key its limits are tracked under
    ///
    /// Known sites collapse all their mirrors and CDNs onto one key; any
    /// other host is its own key.
    pub fn site_key(host: &str) -> String {
        let known = HOST_DOWNLOAD_CAPS
            .iter()
            .map(|(k, _)| *k)
            .chain(HOST_REQUEST_RATES.iter().map(|(k, _, _)| *k))
            .chain(HOST_SPACING.iter().map(|(k, _)| *k));
        site_key_for(host, known)
            .map(str::to_string)
            .unwrap_or_else(|| host.to_string())
    }

    /// Effective simultaneous download limit for a site
    pub fn download_limit(&self, site: &str) -> u32 {
        let cap = HOST_DOWNLOAD_CAPS
            .iter()
            .find(|(k, _)| *k == site)
            .map(|(_, cap)| *cap)
            .unwrap_or(u32::MAX);
        cap.min(self.per_site_limit).max(1)
    }

    fn spacing(&self, site: &str) -> Duration {
        let base = HOST_SPACING
            .iter()
            .find(|(k, _)| *k == site)
            .map(|(_, s)| *s)
            .unwrap_or(DEFAULT_HOST_SPACING);
        Duration::from_secs_f64(base) + self.download_delay
    }

    fn jitter_delay(&self) -> Duration {
        if self.jitter > 0.0 {
            Duration::from_secs_f64(rand::rng().random_range(0.0..self.jitter))
        } else {
            Duration::ZERO
        }
    }

    fn site_limiter(&self, site: &str) -> Arc<Limiter> {
        self.site_requests
            .entry(site.to_string())
            .or_insert_with(|| {
                let (rate, period) = HOST_REQUEST_RATES
                    .iter()
                    .find(|(k, _, _)| *k == site)
                    .map(|(_, rate, period)| (*rate, Duration::from_secs(*period)))
                    .unwrap_or((DEFAULT_HOST_REQUEST_RATE, Duration::from_secs(1)));
                Arc::new(request_limiter(rate, period))
            })
            .clone()
    }

    fn site_semaphore(&self, site: &str) -> Arc<Semaphore> {
        let limit = self.download_limit(site) as usize;
        self.site_downloads
            .entry(site.to_string())
            .or_insert_with(|| {
                let semaphore = Semaphore::new(limit);
                if self.downloads.is_closed() {
                    semaphore.close();
                }
                Arc::new(semaphore)
            })
            .clone()
    }

    /// Reserves the next start time on a site and returns how long to wait
    ///
    /// The reservation is made under the lock, so concurrent callers queue
    /// behind each other instead of all waking at the same instant.
    fn reserve_start(&self, site: &str) -> Duration {
        let spacing = self.spacing(site);
        let mut states = self.domain_states.lock();
        let state = states.entry(site.to_string()).or_default();
        let now = Instant::now();
        let wait = state
            .time_until_next_download(spacing, now)
            .unwrap_or(Duration::ZERO);
        state.record_download(now + wait);
        wait
    }

    /// Waits for a request token for `host`
    ///
    /// Every outbound request, from crawlers and downloads alike, passes here.
    pub async fn acquire_request(&self, host: &str) {
        self.global_requests.until_ready().await;
        let limiter = self.site_limiter(&Self::site_key(host));
        limiter.until_ready().await;
    }

    /// Waits until a download of `destination` on `host` may start
    ///
    /// Suspends without a timeout. Cancelling the returned future releases
    /// whatever was already acquired. Fails only after [`Governor::close`].
    pub async fn acquire_download(
        &self,
        host: &str,
        destination: &Path,
    ) -> Result<DownloadSlot, AcquireError> {
        let site = Self::site_key(host);

        let site_permit = self.site_semaphore(&site).acquire_owned().await?;
        let global_permit = self.downloads.clone().acquire_owned().await?;
        let file_guard = self.file_locks.lock(destination).await;

        let wait = self.reserve_start(&site) + self.jitter_delay();
        if !wait.is_zero() {
            tracing::trace!("Spacing downloads on {}: waiting {:?}", site, wait);
            tokio::time::sleep(wait).await;
        }

        self.acquire_request(host).await;

        Ok(DownloadSlot {
            site,
            _file: file_guard,
            _global: global_permit,
            _site: site_permit,
        })
    }

    /// Closes every download semaphore
    ///
    /// Waiting and future `acquire_download` calls fail immediately; slots
    /// already handed out stay valid until dropped.
    pub fn close(&self) {
        self.downloads.close();
        for entry in self.site_downloads.iter() {
            entry.value().close();
        }
    }

    /// Records a 429 answer from a host
    pub fn mark_rate_limited(&self, host: &str) {
        let site = Self::site_key(host);
        self.domain_states
            .lock()
            .entry(site)
            .or_default()
            .mark_rate_limited();
    }

    /// Sites that answered 429 during this run
    pub fn rate_limited_sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self
            .domain_states
            .lock()
            .iter()
            .filter(|(_, s)| s.rate_limited)
            .map(|(k, _)| k.clone())
            .collect();
        sites.sort();
        sites
    }

    /// Free global download slots (for tests and progress output)
    pub fn available_downloads(&self) -> usize {
        self.downloads.available_permits()
    }

    /// Takes ownership of an additional destination
    ///
    /// Used when a download inside a slot moves to a new file name because
    /// the original one is taken.
    pub async fn lock_destination(&self, destination: &Path) -> OwnedMutexGuard<()> {
        self.file_locks.lock(destination).await
    }
}

/// Limiter allowing `max_rate` requests per `period`, all of them in one burst
///
/// A rate of zero is treated as one.
fn request_limiter(max_rate: u32, period: Duration) -> Limiter {
    let burst = NonZeroU32::new(max_rate).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(period / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}

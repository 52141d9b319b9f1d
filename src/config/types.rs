use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    #[serde(rename = "rate-limiting", default)]
    pub rate_limiting: RateLimitingConfig,
    #[serde(rename = "download-options", default)]
    pub download_options: DownloadOptions,
    #[serde(rename = "ignore-options", default)]
    pub ignore_options: IgnoreOptions,
    #[serde(rename = "file-size-limits", default)]
    pub file_size_limits: FileSizeLimits,
    #[serde(rename = "dupe-cleanup", default)]
    pub dupe_cleanup: DupeCleanupConfig,
    #[serde(default)]
    pub crawlers: CrawlerConfig,
}

/// Paths and process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Root folder for finished downloads
    #[serde(rename = "download-folder")]
    pub download_folder: PathBuf,

    /// Path to the SQLite history database
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,

    /// Folder for the CSV error logs
    #[serde(rename = "log-folder", default = "default_log_folder")]
    pub log_folder: PathBuf,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Downloads refuse to start when less than this is free (MiB)
    #[serde(rename = "required-free-space-mb", default = "default_required_free_space")]
    pub required_free_space_mb: u64,

    #[serde(rename = "delete-partial-files-on-cancel", default)]
    pub delete_partial_files_on_cancel: bool,
}

/// Request rate, concurrency and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    /// Global outbound requests per second
    #[serde(rename = "rate-limit", default = "default_rate_limit")]
    pub rate_limit: u32,

    #[serde(rename = "max-simultaneous-downloads", default = "default_max_downloads")]
    pub max_simultaneous_downloads: u32,

    #[serde(
        rename = "max-simultaneous-downloads-per-domain",
        default = "default_max_downloads_per_domain"
    )]
    pub max_simultaneous_downloads_per_domain: u32,

    /// Extra delay between two downloads from the same host (seconds)
    #[serde(rename = "download-delay", default)]
    pub download_delay: f64,

    /// Upper bound of the random delay added on top of `download-delay` (seconds)
    #[serde(default)]
    pub jitter: f64,

    #[serde(rename = "download-attempts", default = "default_download_attempts")]
    pub download_attempts: u32,

    #[serde(rename = "disable-download-attempt-limit", default)]
    pub disable_download_attempt_limit: bool,

    /// Bytes per second; 0 disables the slow download check
    #[serde(rename = "slow-download-speed", default)]
    pub slow_download_speed: u64,

    /// Seconds a transfer may stay below `slow-download-speed`
    #[serde(rename = "slow-download-window", default = "default_slow_window")]
    pub slow_download_window: u64,

    #[serde(rename = "connection-timeout", default = "default_connection_timeout")]
    pub connection_timeout: u64,

    #[serde(rename = "read-timeout", default = "default_read_timeout")]
    pub read_timeout: u64,
}

/// Scrape expansion and history behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadOptions {
    /// Children caps indexed by kind: forum, forum post, profile, album.
    /// A missing entry or 0 means unlimited.
    #[serde(rename = "maximum-number-of-children", default)]
    pub maximum_number_of_children: Vec<u32>,

    #[serde(rename = "maximum-thread-depth", default)]
    pub maximum_thread_depth: u32,

    /// Scrape items nested deeper than this below their input URL are dropped
    #[serde(rename = "maximum-scrape-depth", default = "default_scrape_depth")]
    pub maximum_scrape_depth: u32,

    #[serde(rename = "skip-referer-seen-before", default)]
    pub skip_referer_seen_before: bool,

    #[serde(rename = "ignore-history", default)]
    pub ignore_history: bool,

    #[serde(rename = "skip-download-mark-completed", default)]
    pub skip_download_mark_completed: bool,

    /// Put every file directly in its host folder instead of per-album folders
    #[serde(rename = "block-download-sub-folders", default)]
    pub block_download_sub_folders: bool,
}

/// Host patterns served by the built-in crawlers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlerConfig {
    /// Hosts whose pages are plain directory listings
    #[serde(rename = "index-hosts", default)]
    pub index_hosts: Vec<String>,
}

/// File type and host filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IgnoreOptions {
    #[serde(rename = "exclude-images", default)]
    pub exclude_images: bool,

    #[serde(rename = "exclude-videos", default)]
    pub exclude_videos: bool,

    #[serde(rename = "exclude-audio", default)]
    pub exclude_audio: bool,

    #[serde(rename = "exclude-other", default)]
    pub exclude_other: bool,

    /// Host patterns that are never scraped or downloaded
    #[serde(rename = "skip-hosts", default)]
    pub skip_hosts: Vec<String>,

    /// When non-empty, only these host patterns are scraped or downloaded
    #[serde(rename = "only-hosts", default)]
    pub only_hosts: Vec<String>,
}

/// Size bounds in bytes; 0 means no bound
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSizeLimits {
    #[serde(rename = "minimum-image-size", default)]
    pub minimum_image_size: u64,
    #[serde(rename = "maximum-image-size", default)]
    pub maximum_image_size: u64,
    #[serde(rename = "minimum-video-size", default)]
    pub minimum_video_size: u64,
    #[serde(rename = "maximum-video-size", default)]
    pub maximum_video_size: u64,
    #[serde(rename = "minimum-other-size", default)]
    pub minimum_other_size: u64,
    #[serde(rename = "maximum-other-size", default)]
    pub maximum_other_size: u64,
}

/// When file digests are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashingMode {
    Off,
    InPlace,
    PostDownload,
}

/// Which duplicate survives a dedup pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    KeepOldest,
    KeepNewest,
    KeepOldestAll,
    KeepNewestAll,
}

/// Hashing and duplicate removal
#[derive(Debug, Clone, Deserialize)]
pub struct DupeCleanupConfig {
    #[serde(default = "default_hashing")]
    pub hashing: HashingMode,

    #[serde(rename = "add-sha256-hash", default)]
    pub add_sha256_hash: bool,

    #[serde(rename = "add-blake3-hash", default)]
    pub add_blake3_hash: bool,

    #[serde(rename = "auto-dedupe", default = "default_true")]
    pub auto_dedupe: bool,

    #[serde(default = "default_retention")]
    pub retention: RetentionPolicy,

    #[serde(rename = "send-deleted-to-trash", default = "default_true")]
    pub send_deleted_to_trash: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            max_simultaneous_downloads: default_max_downloads(),
            max_simultaneous_downloads_per_domain: default_max_downloads_per_domain(),
            download_delay: 0.0,
            jitter: 0.0,
            download_attempts: default_download_attempts(),
            disable_download_attempt_limit: false,
            slow_download_speed: 0,
            slow_download_window: default_slow_window(),
            connection_timeout: default_connection_timeout(),
            read_timeout: default_read_timeout(),
        }
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            maximum_number_of_children: Vec::new(),
            maximum_thread_depth: 0,
            maximum_scrape_depth: default_scrape_depth(),
            skip_referer_seen_before: false,
            ignore_history: false,
            skip_download_mark_completed: false,
            block_download_sub_folders: false,
        }
    }
}

impl Default for DupeCleanupConfig {
    fn default() -> Self {
        Self {
            hashing: default_hashing(),
            add_sha256_hash: false,
            add_blake3_hash: false,
            auto_dedupe: true,
            retention: default_retention(),
            send_deleted_to_trash: true,
        }
    }
}

impl GeneralConfig {
    /// Free space floor in bytes
    pub fn required_free_space(&self) -> u64 {
        self.required_free_space_mb.saturating_mul(1024 * 1024)
    }
}

impl RateLimitingConfig {
    /// Attempt cap for one media item, `None` when unlimited
    pub fn attempt_limit(&self) -> Option<u32> {
        if self.disable_download_attempt_limit {
            None
        } else {
            Some(self.download_attempts)
        }
    }
}

impl DownloadOptions {
    /// Children cap for a kind index, `None` when unlimited
    pub fn children_limit(&self, index: usize) -> Option<u32> {
        match self.maximum_number_of_children.get(index) {
            Some(0) | None => None,
            Some(limit) => Some(*limit),
        }
    }
}

fn default_log_folder() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_user_agent() -> String {
    format!("sumi-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_required_free_space() -> u64 {
    5120
}

fn default_rate_limit() -> u32 {
    50
}

fn default_max_downloads() -> u32 {
    15
}

fn default_max_downloads_per_domain() -> u32 {
    5
}

fn default_download_attempts() -> u32 {
    2
}

fn default_scrape_depth() -> u32 {
    10
}

fn default_slow_window() -> u64 {
    10
}

fn default_connection_timeout() -> u64 {
    15
}

fn default_read_timeout() -> u64 {
    300
}

fn default_hashing() -> HashingMode {
    HashingMode::InPlace
}

fn default_retention() -> RetentionPolicy {
    RetentionPolicy::KeepOldest
}

fn default_true() -> bool {
    true
}

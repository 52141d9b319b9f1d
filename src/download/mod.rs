//! Download Manager and its support types
//!
//! This module contains:
//! - HTTP client construction for pages and for file transfers
//! - Error classification for failed attempts
//! - File type and size filters
//! - Free disk space probing
//! - The Download Manager itself

mod client;
mod disk;
mod error;
mod filters;
mod manager;
mod outcome;

pub use client::{build_download_client, build_http_client};
pub use disk::{FreeSpaceSource, SystemFreeSpace};
pub use error::{classify_status, DownloadError};
pub use filters::{
    check_allowed_filetype, check_filesize_limits, has_size_limits, size_bounds, MediaKind,
    ARCHIVE_EXTENSIONS, AUDIO_EXTENSIONS, FILE_FORMATS, IMAGE_EXTENSIONS, TEXT_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
pub use manager::{DownloadManager, DownloadSettings, KNOWN_BAD_URLS};
pub use outcome::{CompletedDownload, Outcome, SkipReason};

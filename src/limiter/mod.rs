//! Rate limiting and concurrency control
//!
//! This module handles:
//! - Global and per-site request rate limiters
//! - Global and per-site download semaphores
//! - Minimum spacing (plus jitter) between download starts on a site
//! - Exclusive ownership of each download destination

mod file_locks;
mod governor;

pub use file_locks::FileLocks;
pub use governor::{
    DownloadSlot, Governor, DEFAULT_HOST_REQUEST_RATE, DEFAULT_HOST_SPACING, HOST_DOWNLOAD_CAPS,
    HOST_REQUEST_RATES, HOST_SPACING,
};

//! Scrape scheduling and run orchestration
//!
//! This module contains:
//! - Per-root expansion contexts holding the children counters
//! - The scrape mapper routing URLs to crawlers, direct downloads or the
//!   unsupported log
//! - The coordinator running scrapes and downloads concurrently

mod context;
mod coordinator;
mod mapper;

pub use context::{ChildCategory, ExpansionContext};
pub use coordinator::{CancelHandle, Coordinator};
pub use mapper::{Route, ScrapeMapper, LOOSE_FILES_FOLDER};

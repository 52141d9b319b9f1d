//! Crawler interface and built-in crawlers
//!
//! This module contains:
//! - The work items crawlers produce and consume
//! - The `Crawler` trait and the context passed to it
//! - The registry resolving a URL to its crawler
//! - `IndexCrawler`, a generic crawler for plain HTML pages

mod index;
mod items;
mod registry;
mod traits;

pub use index::{parse_index, IndexCrawler, IndexPage};
pub use items::{MediaItem, ScrapeItem, ScrapeItemKind, ScrapeOutput};
pub use registry::CrawlerRegistry;
pub use traits::{CrawlError, Crawler, CrawlerContext};

//! Routing of scrape items before any crawler runs

use crate::config::Config;
use crate::crawler::{Crawler, CrawlerRegistry, MediaItem, ScrapeItem};
use crate::download::MediaKind;
use crate::url::{extract_domain, filename_from_url, is_blocked_domain, matches_any, split_extension};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Folder for files linked directly instead of through a supported page
pub const LOOSE_FILES_FOLDER: &str = "Loose Files";

/// Where a scrape item goes
pub enum Route {
    /// Hand to this crawler
    Crawl(Arc<dyn Crawler>, ScrapeItem),
    /// A direct link to a file on an unsupported host
    Direct(MediaItem),
    /// No crawler and not a file
    Unsupported(ScrapeItem),
    /// Dropped by a filter, with the reason
    Filtered(&'static str),
}

/// Decides what happens to each scrape item
///
/// Tracks every URL routed during the run so a page reachable along two
/// paths is only scraped once.
pub struct ScrapeMapper {
    registry: CrawlerRegistry,
    seen: HashSet<Url>,
    skip_hosts: Vec<String>,
    only_hosts: Vec<String>,
    loose_folder: PathBuf,
}

impl ScrapeMapper {
    pub fn new(registry: CrawlerRegistry, config: &Config) -> Self {
        Self {
            registry,
            seen: HashSet::new(),
            skip_hosts: config.ignore_options.skip_hosts.clone(),
            only_hosts: config.ignore_options.only_hosts.clone(),
            loose_folder: config.general.download_folder.join(LOOSE_FILES_FOLDER),
        }
    }

    pub fn registry(&self) -> &CrawlerRegistry {
        &self.registry
    }

    /// Routes one item
    ///
    /// # Filters
    ///
    /// | Check | Result |
    /// |-------|--------|
    /// | No host | Filtered |
    /// | Blocked social media domain | Filtered |
    /// | Host in `skip-hosts` | Filtered |
    /// | `only-hosts` set and host not in it | Filtered |
    /// | URL already routed this run | Filtered |
    /// | Crawler registered for the host | Crawl |
    /// | Last path segment has a known file extension | Direct |
    /// | Anything else | Unsupported |
    pub fn route(&mut self, item: ScrapeItem) -> Route {
        let Some(host) = extract_domain(&item.url) else {
            return Route::Filtered("No Host");
        };
        if is_blocked_domain(&host) {
            return Route::Filtered("Blocked Domain");
        }
        if matches_any(&self.skip_hosts, &host) {
            return Route::Filtered("Skipped Host");
        }
        if !self.only_hosts.is_empty() && !matches_any(&self.only_hosts, &host) {
            return Route::Filtered("Not In Only Hosts");
        }
        if !self.seen.insert(item.url.clone()) {
            return Route::Filtered("Duplicate");
        }

        if let Some(crawler) = self.registry.resolve(&item.url) {
            return Route::Crawl(crawler, item);
        }

        match direct_filename(&item.url) {
            Some(filename) => {
                let url = item.url.clone();
                Route::Direct(MediaItem::new(url, &item, self.loose_folder.clone(), filename))
            }
            None => Route::Unsupported(item),
        }
    }
}

/// File name of a URL that points straight at a known file type
fn direct_filename(url: &Url) -> Option<String> {
    let filename = filename_from_url(url)?;
    let (_, ext) = split_extension(&filename);
    match ext.as_deref() {
        Some(".htm") | Some(".html") => None,
        ext if MediaKind::from_extension(ext) != MediaKind::Other => Some(filename),
        _ => None,
    }
}

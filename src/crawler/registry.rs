//! Crawler lookup by host

use crate::config::CrawlerConfig;
use crate::crawler::{Crawler, IndexCrawler};
use crate::url::{extract_domain, matches_wildcard};
use std::sync::Arc;
use url::Url;

/// Crawlers keyed by host pattern
///
/// A pattern is an exact host, a `*.` wildcard, or a bare site key such as
/// `"bunkr"` that matches any host containing it.
#[derive(Clone, Default)]
pub struct CrawlerRegistry {
    entries: Vec<(String, Arc<dyn Crawler>)>,
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in crawlers enabled by the configuration
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let mut registry = Self::new();
        for host in &config.index_hosts {
            let domain = host.trim_start_matches("*.").to_string();
            registry.register(host.clone(), Arc::new(IndexCrawler::new(domain)));
        }
        registry
    }

    pub fn register(&mut self, pattern: impl Into<String>, crawler: Arc<dyn Crawler>) {
        self.entries.push((pattern.into().to_lowercase(), crawler));
    }

    /// Finds the crawler for a URL
    ///
    /// Exact and wildcard matches win; otherwise the longest bare pattern
    /// contained in the host is used.
    pub fn resolve(&self, url: &Url) -> Option<Arc<dyn Crawler>> {
        let host = extract_domain(url)?;

        if let Some((_, crawler)) = self
            .entries
            .iter()
            .find(|(pattern, _)| matches_wildcard(pattern, &host))
        {
            return Some(Arc::clone(crawler));
        }

        self.entries
            .iter()
            .filter(|(pattern, _)| !pattern.starts_with("*.") && host.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, crawler)| Arc::clone(crawler))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered patterns, in registration order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(pattern, _)| pattern.as_str())
    }
}

//! Generic crawler for plain HTML pages and directory listings
//!
//! This crawler extracts:
//! - Files linked from `<a href>` whose extension is a known file format
//! - Images (`<img src>`) and video sources (`<video src>`, `<source src>`)
//! - Other pages on the same host, which become further scrape items

use crate::crawler::{CrawlError, Crawler, CrawlerContext, MediaItem, ScrapeItem, ScrapeItemKind, ScrapeOutput};
use crate::download::MediaKind;
use crate::url::{extract_domain, filename_from_url, history_path, split_extension};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// Links found on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Links to downloadable files, in page order
    pub files: Vec<Url>,

    /// Links to other pages, in page order
    pub pages: Vec<Url>,
}

/// Parses a page into file and page links
///
/// # Link Extraction Rules
///
/// **Files:**
/// - `<a href>` whose last path segment has a known file extension
/// - `<img src>`, `<video src>`, `<video><source src>`
///
/// **Pages:** every other `<a href>`
///
/// **Excluded:** `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only
/// links, and anything that is not http(s) after resolution
pub fn parse_index(html: &str, base_url: &Url) -> IndexPage {
    let document = Html::parse_document(html);
    let mut page = IndexPage {
        title: extract_title(&document),
        ..IndexPage::default()
    };
    let mut seen = HashSet::new();

    for (selector, attr) in [("img[src]", "src"), ("video[src]", "src"), ("video source[src]", "src")] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(url) = element.value().attr(attr).and_then(|href| resolve_link(href, base_url)) {
                if seen.insert(url.clone()) {
                    page.files.push(url);
                }
            }
        }
    }

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            let Some(url) = element.value().attr("href").and_then(|href| resolve_link(href, base_url)) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            if is_file_link(&url) {
                page.files.push(url);
            } else {
                page.pages.push(url);
            }
        }
    }

    page
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// True when the URL names a file of a known format other than a web page
fn is_file_link(url: &Url) -> bool {
    let Some(name) = filename_from_url(url) else {
        return false;
    };
    let (_, ext) = split_extension(&name);
    match ext.as_deref() {
        Some(".htm") | Some(".html") => false,
        ext => MediaKind::from_extension(ext) != MediaKind::Other,
    }
}

/// Resolves a link href to an absolute http(s) URL without fragment
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Crawler for hosts that serve plain HTML pages
///
/// Files land in a folder named after the page title. Each page is an album
/// keyed by its path, so files a previous run completed are left out before
/// they reach the Download Manager. Pages on the same host are followed as
/// generic children; the scheduler bounds how deep that goes.
pub struct IndexCrawler {
    domain: String,
}

impl IndexCrawler {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

#[async_trait]
impl Crawler for IndexCrawler {
    fn name(&self) -> &str {
        "Index"
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn scrape(&self, item: &ScrapeItem, ctx: &CrawlerContext) -> Result<ScrapeOutput, CrawlError> {
        let (page_url, body) = ctx.get_text(&item.url).await?;

        let base = page_url.clone();
        let page = tokio::task::spawn_blocking(move || parse_index(&body, &base))
            .await
            .map_err(|e| CrawlError::Parse {
                url: page_url.to_string(),
                message: e.to_string(),
            })?;

        let title = page
            .title
            .clone()
            .unwrap_or_else(|| page_url.path().trim_matches('/').replace('/', " "));
        let folder = ctx.folder_for(if title.is_empty() { &self.domain } else { &title }, &self.domain);

        let album_id = page_url.path().to_string();
        let album = item.clone().with_album_id(album_id.clone());
        let mut known = HashMap::new();
        for domain in page.files.iter().filter_map(extract_domain).collect::<HashSet<_>>() {
            for (path, completed) in ctx.check_album(&domain, &album_id)? {
                known.insert((domain.clone(), path), completed);
            }
        }

        let mut output = ScrapeOutput::default();
        for link in page.files {
            let Some(filename) = filename_from_url(&link) else {
                continue;
            };
            let media = MediaItem::new(link, &album, folder.clone(), filename);
            if known.get(&(media.domain.clone(), history_path(&media.url))) == Some(&true) {
                output.previously_completed += 1;
                continue;
            }
            output.media.push(media);
        }

        let host = page_url.host_str();
        for link in page.pages {
            if link.host_str() != host || link == item.url || link == page_url {
                continue;
            }
            if item.parents.contains(&link) {
                continue;
            }
            output.children.push(item.child(link, ScrapeItemKind::Generic));
        }

        debug!(
            "{}: {} files, {} pages on {}",
            self.name(),
            output.media.len(),
            output.children.len(),
            item.url
        );
        Ok(output)
    }
}

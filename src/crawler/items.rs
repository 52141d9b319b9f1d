//! Work items passed between crawlers, the scheduler and the Download Manager

use crate::url::{extract_domain, split_extension};
use std::path::{Path, PathBuf};
use url::Url;

/// What a scrape item points at
///
/// The kind selects which entry of `maximum-number-of-children` caps the
/// item's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrapeItemKind {
    /// A forum thread
    Forum,
    /// A single post inside a thread
    ForumPost,
    /// A user profile on a file host
    FileHostProfile,
    /// An album on a file host
    FileHostAlbum,
    /// Anything else
    Generic,
}

impl ScrapeItemKind {
    /// Index into `maximum-number-of-children`, `None` for unlimited kinds
    pub fn limit_index(&self) -> Option<usize> {
        match self {
            Self::Forum => Some(0),
            Self::ForumPost => Some(1),
            Self::FileHostProfile => Some(2),
            Self::FileHostAlbum => Some(3),
            Self::Generic => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forum => "forum",
            Self::ForumPost => "forum-post",
            Self::FileHostProfile => "file-host-profile",
            Self::FileHostAlbum => "file-host-album",
            Self::Generic => "generic",
        }
    }
}

/// A pending unit of link-discovery work
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeItem {
    pub url: Url,
    pub kind: ScrapeItemKind,
    /// Ancestors, input URL first
    pub parents: Vec<Url>,
    /// Ancestors that are forum threads
    pub parent_threads: Vec<Url>,
    /// Overrides the configured cap for this item's kind
    pub children_limit: Option<u32>,
    pub depth: u32,
    pub album_id: Option<String>,
}

impl ScrapeItem {
    /// An input URL
    pub fn root(url: Url) -> Self {
        Self {
            url,
            kind: ScrapeItemKind::Generic,
            parents: Vec::new(),
            parent_threads: Vec::new(),
            children_limit: None,
            depth: 0,
            album_id: None,
        }
    }

    /// A scrape item discovered on this one
    ///
    /// The child is one level deeper, lists this item as its last parent
    /// and, when this item is a thread, as its innermost parent thread.
    pub fn child(&self, url: Url, kind: ScrapeItemKind) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.url.clone());

        let mut parent_threads = self.parent_threads.clone();
        if self.kind == ScrapeItemKind::Forum && !parent_threads.contains(&self.url) {
            parent_threads.push(self.url.clone());
        }

        Self {
            url,
            kind,
            parents,
            parent_threads,
            children_limit: None,
            depth: self.depth + 1,
            album_id: None,
        }
    }

    pub fn with_album_id(mut self, album_id: impl Into<String>) -> Self {
        self.album_id = Some(album_id.into());
        self
    }

    pub fn with_children_limit(mut self, limit: u32) -> Self {
        self.children_limit = Some(limit);
        self
    }

    /// The input URL this item was expanded from
    pub fn origin(&self) -> &Url {
        self.parents.first().unwrap_or(&self.url)
    }

    /// The item this one was discovered on
    pub fn parent(&self) -> Option<&Url> {
        self.parents.last()
    }

    /// Number of threads this item is nested in
    pub fn thread_depth(&self) -> usize {
        self.parent_threads.len()
    }
}

/// A single downloadable file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub url: Url,
    /// Page the file was found on
    pub referer: Url,
    /// Domain part of the history key
    pub domain: String,
    pub album_id: Option<String>,
    /// Provenance chain, input URL first, referer last
    pub parents: Vec<Url>,
    pub download_folder: PathBuf,
    pub filename: String,
    pub original_filename: String,
    /// Lowercase extension with the dot
    pub ext: Option<String>,
    pub expected_size: Option<u64>,
    pub duration: Option<f64>,
    /// Hex SHA-256 published by the host, checked after the transfer
    pub expected_sha256: Option<String>,
}

impl MediaItem {
    /// A file found on `parent`
    pub fn new(url: Url, parent: &ScrapeItem, download_folder: PathBuf, filename: String) -> Self {
        let mut parents = parent.parents.clone();
        parents.push(parent.url.clone());
        let (_, ext) = split_extension(&filename);

        Self {
            domain: extract_domain(&url).unwrap_or_default(),
            referer: parent.url.clone(),
            album_id: parent.album_id.clone(),
            parents,
            download_folder,
            original_filename: filename.clone(),
            filename,
            ext,
            url,
            expected_size: None,
            duration: None,
            expected_sha256: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_expected_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into().to_lowercase());
        self
    }

    /// Where the finished file goes
    pub fn complete_path(&self) -> PathBuf {
        self.download_folder.join(&self.filename)
    }

    /// Where the in-progress transfer for `complete` is written
    pub fn part_path_for(complete: &Path) -> PathBuf {
        let mut name = complete
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        complete.with_file_name(name)
    }

    /// The input URL this file was expanded from
    pub fn origin(&self) -> &Url {
        self.parents.first().unwrap_or(&self.referer)
    }
}

/// What one crawler invocation found
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutput {
    pub children: Vec<ScrapeItem>,
    pub media: Vec<MediaItem>,
    /// Newest post seen on a thread, for the last-post log
    pub last_post: Option<Url>,
    /// Files left out because history already has them completed
    pub previously_completed: u32,
}

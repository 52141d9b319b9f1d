//! CSV logs written during a run
//!
//! Every row names the failing URL and where it came from, so a user can
//! trace a failure back to the input URL that produced it. Error rows also
//! carry the full chain of pages between the two, joined by `" > "`.

use crate::output::OutputResult;
use csv::{QuoteStyle, Writer, WriterBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

/// One log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    ScrapeErrors,
    DownloadErrors,
    Unsupported,
    LastForumPosts,
    Dedupe,
}

impl LogCategory {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::ScrapeErrors => "Scrape_Error_URLs.csv",
            Self::DownloadErrors => "Download_Error_URLs.csv",
            Self::Unsupported => "Unsupported_URLs.csv",
            Self::LastForumPosts => "Last_Scraped_Forum_Posts.csv",
            Self::Dedupe => "Dedupe.csv",
        }
    }

    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Self::ScrapeErrors => &["url", "error", "parents", "origin"],
            Self::DownloadErrors => &["url", "error", "referer", "parents", "origin"],
            Self::Unsupported => &["url", "origin"],
            Self::LastForumPosts => &["url"],
            Self::Dedupe => &["original_file", "hash", "removed_file"],
        }
    }
}

/// Appending CSV writers, one per category, opened on first use
///
/// A header is written only when the file is new or empty, so logs from
/// several runs accumulate in the same files.
pub struct CsvLogs {
    folder: PathBuf,
    writers: Mutex<HashMap<LogCategory, Writer<File>>>,
}

impl CsvLogs {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path(&self, category: LogCategory) -> PathBuf {
        self.folder.join(category.file_name())
    }

    /// Appends one row and flushes it
    pub fn write(&self, category: LogCategory, record: &[&str]) -> OutputResult<()> {
        let mut writers = self.writers.lock();
        if !writers.contains_key(&category) {
            let writer = self.open(category)?;
            writers.insert(category, writer);
        }
        if let Some(writer) = writers.get_mut(&category) {
            writer.write_record(record)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn open(&self, category: LogCategory) -> OutputResult<Writer<File>> {
        fs::create_dir_all(&self.folder)?;
        let path = self.path(category);
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(file);
        if is_new {
            writer.write_record(category.header())?;
        }
        Ok(writer)
    }

    pub fn scrape_error(&self, url: &Url, reason: &str, parents: &[Url], origin: &Url) {
        let chain = join_chain(parents);
        self.log(
            LogCategory::ScrapeErrors,
            &[url.as_str(), reason, &chain, origin.as_str()],
        );
    }

    pub fn download_error(&self, url: &Url, reason: &str, referer: &Url, parents: &[Url], origin: &Url) {
        let chain = join_chain(parents);
        self.log(
            LogCategory::DownloadErrors,
            &[url.as_str(), reason, referer.as_str(), &chain, origin.as_str()],
        );
    }

    pub fn unsupported(&self, url: &Url, origin: &Url) {
        self.log(LogCategory::Unsupported, &[url.as_str(), origin.as_str()]);
    }

    pub fn last_post(&self, url: &Url) {
        self.log(LogCategory::LastForumPosts, &[url.as_str()]);
    }

    pub fn dedupe(&self, kept: &Path, digest: &str, removed: &Path) {
        let kept = kept.to_string_lossy();
        let removed = removed.to_string_lossy();
        self.log(LogCategory::Dedupe, &[&kept, digest, &removed]);
    }

    // a log that cannot be written must not fail the item it describes
    fn log(&self, category: LogCategory, record: &[&str]) {
        if let Err(e) = self.write(category, record) {
            warn!("Unable to write {}: {}", category.file_name(), e);
        }
    }
}

/// Parent pages, outermost first
fn join_chain(parents: &[Url]) -> String {
    parents.iter().map(Url::as_str).collect::<Vec<_>>().join(" > ")
}

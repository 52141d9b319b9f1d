//! Storage module for persisting download history and file digests
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and fail-closed schema checks
//! - Download history (the skip decisions made before any network I/O)
//! - Referers first seen during the current run
//! - File digests for the hash reuse and deduplication passes

mod schema;
mod sqlite;
mod traits;

pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Storage handle shared between concurrent scrape and download tasks
///
/// One connection serves the whole process; the mutex serializes writers
/// and every statement is short, so readers never wait long.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens (or creates) the history database and wraps it for sharing
pub fn open_storage(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// A row of the download history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub domain: String,
    /// Path part of the history key, see `url::history_path`
    pub url_path: String,
    pub referer: String,
    pub album_id: Option<String>,
    /// Folder the file is (or will be) written to
    pub download_path: String,
    pub download_filename: String,
    pub original_filename: String,
    pub completed: bool,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub file_size: Option<u64>,
    pub duration: Option<f64>,
}

/// A stored digest of a file on disk
#[derive(Debug, Clone, PartialEq)]
pub struct HashRecord {
    pub folder: String,
    pub download_filename: String,
    /// Algorithm name as produced by `HashAlgorithm::as_str`
    pub algorithm: String,
    pub digest: String,
    pub file_size: u64,
    pub original_filename: Option<String>,
    pub referer: Option<String>,
    /// When the file was downloaded (RFC 3339)
    pub downloaded_at: String,
}

impl HashRecord {
    /// Full path of the hashed file
    pub fn path(&self) -> std::path::PathBuf {
        Path::new(&self.folder).join(&self.download_filename)
    }
}

/// Totals shown by the `--stats` mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryCounts {
    pub total: u64,
    pub completed: u64,
    pub hashed_files: u64,
    pub domains: u64,
}

//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{HashRecord, HistoryCounts, HistoryRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any of these is fatal for a run: skip decisions cannot be trusted
/// without a working store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database schema is incomplete, missing tables: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Reads take `&self` and are safe to issue before any network request for
/// an item. Writes take `&mut self`; each one is a single statement or an
/// explicit transaction, so a crash never leaves a partial record.
pub trait Storage {
    // ===== Download History =====

    /// Returns true if a completed record exists for `(domain, url_path)`
    /// under any referer
    fn check_complete(&self, domain: &str, url_path: &str) -> StorageResult<bool>;

    /// Returns true if any record (complete or not) was found on `referer`
    fn referer_seen(&self, referer: &str) -> StorageResult<bool>;

    /// Completion flags of every known file of an album, keyed by url path
    fn check_album(&self, domain: &str, album_id: &str) -> StorageResult<HashMap<String, bool>>;

    /// Records a file that is about to be downloaded
    ///
    /// An existing incomplete row is refreshed; a completed row is never
    /// downgraded.
    fn insert_incomplete(&mut self, record: &HistoryRecord) -> StorageResult<()>;

    /// Marks a file as completed, inserting the row if needed
    ///
    /// # Arguments
    ///
    /// * `record` - The history row; `completed` is forced to true
    /// * `file_size` - Final size on disk
    fn mark_complete(&mut self, record: &HistoryRecord, file_size: u64) -> StorageResult<()>;

    /// Every record that never completed, oldest first
    fn get_failed_items(&self) -> StorageResult<Vec<HistoryRecord>>;

    // ===== Run-scoped referers =====

    /// Remembers that `referer` was first seen during the current run
    fn record_session_referer(&mut self, referer: &str) -> StorageResult<()>;

    /// Returns true if `referer` was first seen during the current run
    fn is_session_referer(&self, referer: &str) -> StorageResult<bool>;

    /// Forgets all run-scoped referers (called at run start)
    fn purge_session_referers(&mut self) -> StorageResult<()>;

    // ===== File Digests =====

    /// Stored digest and recorded size of a file for one algorithm
    fn get_hash(
        &self,
        folder: &str,
        filename: &str,
        algorithm: &str,
    ) -> StorageResult<Option<(String, u64)>>;

    /// Inserts or replaces the digest of a file for one algorithm
    fn upsert_hash(&mut self, record: &HashRecord) -> StorageResult<()>;

    /// `(digest, size)` pairs shared by more than one file
    fn duplicate_groups(&self, algorithm: &str) -> StorageResult<Vec<(String, u64)>>;

    /// Files with the given digest and size, oldest download first
    fn files_with_hash(
        &self,
        digest: &str,
        size: u64,
        algorithm: &str,
    ) -> StorageResult<Vec<HashRecord>>;

    // ===== Statistics =====

    fn history_counts(&self) -> StorageResult<HistoryCounts>;

    /// Completed downloads per domain, most first
    fn completed_by_domain(&self) -> StorageResult<Vec<(String, u64)>>;
}

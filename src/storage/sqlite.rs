//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{HashRecord, HistoryCounts, HistoryRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const HISTORY_COLUMNS: &str = "domain, url_path, referer, album_id, download_path, \
     download_filename, original_filename, completed, created_at, completed_at, file_size, duration";

const HASH_COLUMNS: &str =
    "folder, download_filename, hash_type, hash, file_size, original_filename, referer, date";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or the schema check failed
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        domain: row.get(0)?,
        url_path: row.get(1)?,
        referer: row.get(2)?,
        album_id: row.get(3)?,
        download_path: row.get(4)?,
        download_filename: row.get(5)?,
        original_filename: row.get(6)?,
        completed: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
        file_size: row.get::<_, Option<i64>>(10)?.map(|s| s as u64),
        duration: row.get(11)?,
    })
}

fn hash_from_row(row: &Row<'_>) -> rusqlite::Result<HashRecord> {
    Ok(HashRecord {
        folder: row.get(0)?,
        download_filename: row.get(1)?,
        algorithm: row.get(2)?,
        digest: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        original_filename: row.get(5)?,
        referer: row.get(6)?,
        downloaded_at: row.get(7)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Download History =====

    fn check_complete(&self, domain: &str, url_path: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM media WHERE domain = ?1 AND url_path = ?2 AND completed = 1 LIMIT 1",
                params![domain, url_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn referer_seen(&self, referer: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM media WHERE referer = ?1 LIMIT 1",
                params![referer],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn check_album(&self, domain: &str, album_id: &str) -> StorageResult<HashMap<String, bool>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url_path, completed FROM media WHERE domain = ?1 AND album_id = ?2")?;

        let mut album = HashMap::new();
        let rows = stmt.query_map(params![domain, album_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0))
        })?;
        for row in rows {
            let (path, completed) = row?;
            let entry = album.entry(path).or_insert(false);
            *entry = *entry || completed;
        }
        Ok(album)
    }

    fn insert_incomplete(&mut self, record: &HistoryRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO media (domain, url_path, referer, album_id, download_path,
                 download_filename, original_filename, completed, created_at, duration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)
             ON CONFLICT (domain, url_path, referer) DO UPDATE SET
                 album_id = COALESCE(excluded.album_id, media.album_id),
                 download_path = excluded.download_path,
                 download_filename = excluded.download_filename
             WHERE media.completed = 0",
            params![
                record.domain,
                record.url_path,
                record.referer,
                record.album_id,
                record.download_path,
                record.download_filename,
                record.original_filename,
                record.created_at,
                record.duration,
            ],
        )?;
        Ok(())
    }

    fn mark_complete(&mut self, record: &HistoryRecord, file_size: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO media (domain, url_path, referer, album_id, download_path,
                 download_filename, original_filename, completed, created_at, completed_at,
                 file_size, duration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?11)
             ON CONFLICT (domain, url_path, referer) DO UPDATE SET
                 completed = 1,
                 completed_at = excluded.completed_at,
                 file_size = excluded.file_size,
                 download_path = excluded.download_path,
                 download_filename = excluded.download_filename",
            params![
                record.domain,
                record.url_path,
                record.referer,
                record.album_id,
                record.download_path,
                record.download_filename,
                record.original_filename,
                record.created_at,
                now,
                file_size as i64,
                record.duration,
            ],
        )?;
        Ok(())
    }

    fn get_failed_items(&self) -> StorageResult<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT {} FROM media m WHERE completed = 0
             AND NOT EXISTS (SELECT 1 FROM media c
                 WHERE c.domain = m.domain AND c.url_path = m.url_path AND c.completed = 1)
             ORDER BY created_at",
            HISTORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], history_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Run-scoped referers =====

    fn record_session_referer(&mut self, referer: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO temp_referer (referer) VALUES (?1)",
            params![referer],
        )?;
        Ok(())
    }

    fn is_session_referer(&self, referer: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM temp_referer WHERE referer = ?1",
                params![referer],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn purge_session_referers(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM temp_referer", [])?;
        Ok(())
    }

    // ===== File Digests =====

    fn get_hash(
        &self,
        folder: &str,
        filename: &str,
        algorithm: &str,
    ) -> StorageResult<Option<(String, u64)>> {
        let found = self
            .conn
            .query_row(
                "SELECT hash, file_size FROM hash
                 WHERE folder = ?1 AND download_filename = ?2 AND hash_type = ?3",
                params![folder, filename, algorithm],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )
            .optional()?;
        Ok(found)
    }

    fn upsert_hash(&mut self, record: &HashRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO hash (folder, download_filename, hash_type, hash, file_size,
                 original_filename, referer, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (folder, download_filename, hash_type) DO UPDATE SET
                 hash = excluded.hash,
                 file_size = excluded.file_size,
                 original_filename = COALESCE(excluded.original_filename, hash.original_filename),
                 referer = COALESCE(excluded.referer, hash.referer),
                 date = excluded.date",
            params![
                record.folder,
                record.download_filename,
                record.algorithm,
                record.digest,
                record.file_size as i64,
                record.original_filename,
                record.referer,
                record.downloaded_at,
            ],
        )?;
        Ok(())
    }

    fn duplicate_groups(&self, algorithm: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT hash, file_size FROM hash WHERE hash_type = ?1
             GROUP BY hash, file_size HAVING COUNT(*) > 1",
        )?;
        let groups = stmt
            .query_map(params![algorithm], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn files_with_hash(
        &self,
        digest: &str,
        size: u64,
        algorithm: &str,
    ) -> StorageResult<Vec<HashRecord>> {
        let sql = format!(
            "SELECT {} FROM hash WHERE hash = ?1 AND file_size = ?2 AND hash_type = ?3
             ORDER BY date, rowid",
            HASH_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![digest, size as i64, algorithm], hash_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Statistics =====

    fn history_counts(&self) -> StorageResult<HistoryCounts> {
        let (total, completed, domains): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(completed), 0), COUNT(DISTINCT domain) FROM media",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let hashed_files: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT folder || '/' || download_filename) FROM hash",
            [],
            |row| row.get(0),
        )?;

        Ok(HistoryCounts {
            total: total as u64,
            completed: completed as u64,
            hashed_files: hashed_files as u64,
            domains: domains as u64,
        })
    }

    fn completed_by_domain(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, COUNT(*) AS n FROM media WHERE completed = 1
             GROUP BY domain ORDER BY n DESC, domain",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

//! Database schema definitions and checks
//!
//! A new database gets the full schema. An existing one must already contain
//! every persistent table; a missing table means the file belongs to another
//! version and opening it fails instead of treating every item as new.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Tables that must survive between runs
const PERSISTENT_TABLES: &[&str] = &["schema_info", "media", "hash"];

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER NOT NULL
);

-- Download history, one row per (file, referer)
CREATE TABLE IF NOT EXISTS media (
    domain TEXT NOT NULL,
    url_path TEXT NOT NULL,
    referer TEXT NOT NULL,
    album_id TEXT,
    download_path TEXT NOT NULL,
    download_filename TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    file_size INTEGER,
    duration REAL,
    PRIMARY KEY (domain, url_path, referer)
);

CREATE INDEX IF NOT EXISTS idx_media_referer ON media(referer);
CREATE INDEX IF NOT EXISTS idx_media_album ON media(domain, album_id);
CREATE INDEX IF NOT EXISTS idx_media_created ON media(created_at);

-- File digests, one row per (file, algorithm)
CREATE TABLE IF NOT EXISTS hash (
    folder TEXT NOT NULL,
    download_filename TEXT NOT NULL,
    hash_type TEXT NOT NULL,
    hash TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    original_filename TEXT,
    referer TEXT,
    date TEXT NOT NULL,
    PRIMARY KEY (folder, download_filename, hash_type)
);

CREATE INDEX IF NOT EXISTS idx_hash_lookup ON hash(hash_type, hash, file_size);
"#;

/// Run-scoped table, recreated freely
const TEMP_REFERER_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS temp_referer (
    referer TEXT PRIMARY KEY
);
"#;

/// Initializes a new database or verifies an existing one
///
/// # Returns
///
/// * `Ok(())` - Schema present and supported
/// * `Err(StorageError::SchemaMismatch)` - Existing database lacks tables
/// * `Err(StorageError::UnsupportedVersion)` - Written by a newer version
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let existing = existing_tables(conn)?;

    if existing.is_empty() {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO schema_info (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    } else {
        let missing: Vec<String> = PERSISTENT_TABLES
            .iter()
            .filter(|t| !existing.iter().any(|e| e == *t))
            .map(|t| t.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(StorageError::SchemaMismatch { missing });
        }

        let found: Option<u32> = conn
            .query_row("SELECT MAX(version) FROM schema_info", [], |row| {
                row.get::<_, Option<u32>>(0)
            })
            .optional()?
            .flatten();

        match found {
            Some(v) if v > SCHEMA_VERSION => {
                return Err(StorageError::UnsupportedVersion {
                    found: v,
                    supported: SCHEMA_VERSION,
                })
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO schema_info (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
        }
    }

    conn.execute_batch(TEMP_REFERER_SQL)?;
    Ok(())
}

fn existing_tables(conn: &Connection) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

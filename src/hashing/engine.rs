use crate::config::Config;
use crate::config::HashingMode;
use crate::hashing::{digest_file, HashAlgorithm};
use crate::storage::{HashRecord, SharedStorage, Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Provenance stored alongside a digest
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub original_filename: Option<String>,
    pub referer: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

impl FileMeta {
    /// Metadata for a file found on disk rather than downloaded
    pub fn from_disk(path: &Path) -> Self {
        let downloaded_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Self {
            original_filename: None,
            referer: None,
            downloaded_at,
        }
    }
}

/// Digest computations and reuses since the engine was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashStats {
    pub computed: u64,
    pub reused: u64,
}

/// Computes file digests, reusing stored ones whenever the size still matches
///
/// A stored digest is trusted for as long as the file keeps its recorded
/// size; a modification time change alone never triggers a recompute.
pub struct HashEngine {
    storage: SharedStorage,
    algorithms: Vec<HashAlgorithm>,
    computed: AtomicU64,
    reused: AtomicU64,
}

impl HashEngine {
    pub fn new(storage: SharedStorage, algorithms: Vec<HashAlgorithm>) -> Self {
        Self {
            storage,
            algorithms,
            computed: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    pub fn from_config(storage: SharedStorage, config: &Config) -> Self {
        Self::new(storage, HashAlgorithm::enabled(&config.dupe_cleanup))
    }

    /// Returns true if the run hashes and deduplicates at all
    pub fn is_enabled(config: &Config) -> bool {
        config.dupe_cleanup.hashing != HashingMode::Off
            && !config.download_options.ignore_history
            && config.dupe_cleanup.auto_dedupe
    }

    pub fn stats(&self) -> HashStats {
        HashStats {
            computed: self.computed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }

    /// Hashes one file with every enabled algorithm
    ///
    /// # Arguments
    ///
    /// * `path` - The file to hash; `.part` and empty files are ignored
    /// * `meta` - Provenance written with newly computed digests
    ///
    /// # Returns
    ///
    /// * `Ok(Some(digest))` - The default-algorithm digest
    /// * `Ok(None)` - The file was ignored or could not be read
    /// * `Err(StorageError)` - The hash store failed
    pub async fn hash_file(&self, path: &Path, meta: &FileMeta) -> StorageResult<Option<String>> {
        if path.extension().is_some_and(|ext| ext == "part") {
            return Ok(None);
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() && m.len() > 0 => m.len(),
            _ => return Ok(None),
        };

        let (Some(folder), Some(filename)) = (
            path.parent().map(|p| p.to_string_lossy().into_owned()),
            path.file_name().map(|n| n.to_string_lossy().into_owned()),
        ) else {
            return Ok(None);
        };

        let mut default_digest = None;
        for algorithm in &self.algorithms {
            let stored = self
                .storage
                .lock()
                .get_hash(&folder, &filename, algorithm.as_str())?;

            let digest = match stored {
                Some((digest, recorded_size)) if recorded_size == size => {
                    self.reused.fetch_add(1, Ordering::Relaxed);
                    debug!("Reusing {} of {}", algorithm, path.display());
                    digest
                }
                _ => {
                    let Some(digest) = compute(path.to_path_buf(), *algorithm).await else {
                        continue;
                    };
                    self.computed.fetch_add(1, Ordering::Relaxed);

                    let record = HashRecord {
                        folder: folder.clone(),
                        download_filename: filename.clone(),
                        algorithm: algorithm.as_str().to_string(),
                        digest: digest.clone(),
                        file_size: size,
                        original_filename: meta.original_filename.clone(),
                        referer: meta.referer.clone(),
                        downloaded_at: meta.downloaded_at.to_rfc3339(),
                    };
                    self.storage.lock().upsert_hash(&record)?;
                    digest
                }
            };

            if *algorithm == HashAlgorithm::DEFAULT {
                default_digest = Some(digest);
            }
        }

        Ok(default_digest)
    }

    /// Hashes every regular file below `dir`
    ///
    /// Files found this way have no referer; their modification time stands
    /// in for the download time.
    pub async fn hash_directory(&self, dir: &Path) -> StorageResult<usize> {
        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect::<Vec<PathBuf>>()
        })
        .await
        .unwrap_or_else(|e| {
            error!("Directory walk of {} failed: {}", dir.display(), e);
            Vec::new()
        });

        let mut hashed = 0;
        for file in files {
            let meta = FileMeta::from_disk(&file);
            if self.hash_file(&file, &meta).await?.is_some() {
                hashed += 1;
            }
        }
        Ok(hashed)
    }
}

/// Digests a file on the blocking pool, logging failures
async fn compute(path: PathBuf, algorithm: HashAlgorithm) -> Option<String> {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || digest_file(&path, algorithm)).await {
        Ok(Ok(digest)) => Some(digest),
        Ok(Err(e)) => {
            warn!("Unable to hash '{}' with {}: {}", shown, algorithm, e);
            None
        }
        Err(e) => {
            error!("Hash task for '{}' failed: {}", shown, e);
            None
        }
    }
}

//! Duplicate removal over the stored digests

use crate::config::RetentionPolicy;
use crate::hashing::HashAlgorithm;
use crate::storage::{HashRecord, SharedStorage, Storage, StorageResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One file removed because another copy survives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub kept: PathBuf,
    pub removed: PathBuf,
    pub digest: String,
    /// Sent to the system trash rather than deleted
    pub trashed: bool,
}

/// Totals of one dedup pass
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    /// Groups with at least two candidates
    pub groups: usize,
    pub removed: Vec<Removal>,
    /// Records whose file was already gone
    pub missing: usize,
    pub failed: usize,
}

/// Applies a retention policy to every group of files sharing a digest
pub struct Deduplicator {
    storage: SharedStorage,
    policy: RetentionPolicy,
    /// Send removals to the system trash instead of deleting them
    use_trash: bool,
    algorithm: HashAlgorithm,
}

impl Deduplicator {
    pub fn new(storage: SharedStorage, policy: RetentionPolicy, use_trash: bool) -> Self {
        Self {
            storage,
            policy,
            use_trash,
            algorithm: HashAlgorithm::DEFAULT,
        }
    }

    /// Runs one pass over all duplicate groups
    ///
    /// Only store failures are returned as errors; a file that cannot be
    /// removed is counted and skipped.
    pub async fn run(&self) -> StorageResult<DedupReport> {
        let groups = self.storage.lock().duplicate_groups(self.algorithm.as_str())?;
        let mut report = DedupReport::default();

        for (digest, size) in groups {
            let records = self
                .storage
                .lock()
                .files_with_hash(&digest, size, self.algorithm.as_str())?;

            let Some((survivor, doomed)) = select_survivor(self.policy, records) else {
                continue;
            };
            report.groups += 1;
            let kept = survivor.path();

            for record in doomed {
                let path = record.path();
                if path == kept || path.extension().is_some_and(|ext| ext == "part") {
                    continue;
                }
                if !path.is_file() {
                    report.missing += 1;
                    continue;
                }

                match self.remove(&path).await {
                    Ok(()) => {
                        let label = if self.use_trash { "Trashed" } else { "Removed" };
                        debug!("{} {} (copy of {})", label, path.display(), kept.display());
                        report.removed.push(Removal {
                            kept: kept.clone(),
                            removed: path,
                            digest: digest.clone(),
                            trashed: self.use_trash,
                        });
                    }
                    Err(e) => {
                        warn!("Unable to remove '{}' with hash {}: {}", path.display(), digest, e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "Dedup: {} groups, {} files removed",
            report.groups,
            report.removed.len()
        );
        Ok(report)
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        if !self.use_trash {
            return tokio::fs::remove_file(path).await;
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || trash::delete(&path))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("trash error: {}", e)))
    }
}

/// Picks the survivor of one group and the records to delete
///
/// `records` must be ordered oldest download first. `KeepOldest` and
/// `KeepNewest` only rank files that still exist; the `All` variants rank
/// every record. Returns `None` when fewer than two candidates remain.
pub fn select_survivor(
    policy: RetentionPolicy,
    mut records: Vec<HashRecord>,
) -> Option<(HashRecord, Vec<HashRecord>)> {
    if matches!(policy, RetentionPolicy::KeepOldest | RetentionPolicy::KeepNewest) {
        records.retain(|r| r.path().is_file());
    }
    if records.len() < 2 {
        return None;
    }
    if matches!(policy, RetentionPolicy::KeepNewest | RetentionPolicy::KeepNewestAll) {
        records.reverse();
    }

    let survivor = records.remove(0);
    Some((survivor, records))
}

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-destination locks
///
/// Whoever holds the guard for a final path is the only writer of its
/// `.part` file. A second item for the same destination waits, then sees the
/// finished file in history and skips.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive ownership of `destination`
    pub async fn lock(&self, destination: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(destination.to_path_buf())
            .or_default()
            .clone();
        tracing::trace!("Waiting for lock on {}", destination.display());
        lock.lock_owned().await
    }
}

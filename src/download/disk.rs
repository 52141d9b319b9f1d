//! Free disk space checks

use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Reports the free space available to a folder
///
/// The Download Manager asks before every transfer and while writing, so a
/// disk filling up mid-run stops new work instead of corrupting files.
pub trait FreeSpaceSource: Send + Sync {
    /// Free bytes on the disk holding `folder`, `None` when unknown
    fn available_space(&self, folder: &Path) -> Option<u64>;
}

/// Source backed by the operating system's mounted disks
#[derive(Debug, Default)]
pub struct SystemFreeSpace;

impl SystemFreeSpace {
    pub fn new() -> Self {
        Self
    }
}

impl FreeSpaceSource for SystemFreeSpace {
    fn available_space(&self, folder: &Path) -> Option<u64> {
        let folder = existing_ancestor(folder)?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| folder.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Closest existing folder at or above `path`, made absolute
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .find_map(|p| p.canonicalize().ok())
        .or_else(|| std::env::current_dir().ok())
}

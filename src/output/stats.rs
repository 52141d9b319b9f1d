//! Statistics generation from the history database
//!
//! This module provides functionality for extracting and displaying
//! download history statistics from the storage layer.

use crate::storage::{HistoryCounts, Storage, StorageResult};

/// History statistics summary
#[derive(Debug, Clone, Default)]
pub struct HistoryStatistics {
    pub counts: HistoryCounts,

    /// Completed downloads per domain, most first
    pub by_domain: Vec<(String, u64)>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HistoryStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HistoryStatistics> {
    Ok(HistoryStatistics {
        counts: storage.history_counts()?,
        by_domain: storage.completed_by_domain()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HistoryStatistics) {
    let counts = &stats.counts;
    println!("=== History Statistics ===\n");

    println!("Overview:");
    println!("  Known files: {}", counts.total);
    println!("  Completed: {}", counts.completed);
    println!("  Incomplete: {}", counts.total.saturating_sub(counts.completed));
    println!("  Hashed files: {}", counts.hashed_files);
    println!("  Domains: {}", counts.domains);
    println!();

    if !stats.by_domain.is_empty() {
        println!("Completed by Domain:");
        for (domain, count) in &stats.by_domain {
            let percentage = if counts.completed > 0 {
                (*count as f64 / counts.completed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", domain, count, percentage);
        }
        println!();
    }
}

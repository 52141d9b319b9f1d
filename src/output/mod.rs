//! Output module for run logs and reports
//!
//! This module handles:
//! - CSV logs of failed, unsupported and deduplicated URLs
//! - The end-of-run report, grouped by failure reason
//! - History statistics for the `--stats` mode

mod logs;
mod report;
pub mod stats;

pub use logs::{CsvLogs, LogCategory};
pub use report::{print_report, RunReport};
pub use stats::{load_statistics, print_statistics, HistoryStatistics};

use thiserror::Error;

/// Errors writing the CSV logs
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

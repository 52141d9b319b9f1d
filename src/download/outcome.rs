use crate::download::DownloadError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use url::Url;

/// Result of handing one media item to the Download Manager
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(CompletedDownload),
    /// Failed after the allowed attempts; may succeed on a later run
    RetryableFailure(DownloadError),
    /// Failed for good; never attempted again
    PermanentFailure(DownloadError),
    Skipped(SkipReason),
}

impl Outcome {
    /// Wraps a final error according to its class
    pub fn failed(error: DownloadError) -> Self {
        match error.class() {
            crate::ErrorClass::Permanent => Self::PermanentFailure(error),
            _ => Self::RetryableFailure(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            Self::RetryableFailure(e) | Self::PermanentFailure(e) => Some(e),
            _ => None,
        }
    }
}

/// Why an item was not transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A completed history record exists
    AlreadyDownloaded,
    /// The referer was seen on an earlier run
    RefererSeen,
    ExcludedFileType,
    SizeLimit,
    /// Recorded as completed without a transfer
    MarkedCompleted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyDownloaded => "Already Downloaded",
            Self::RefererSeen => "Referer Seen Before",
            Self::ExcludedFileType => "Excluded File Type",
            Self::SizeLimit => "Outside Size Limits",
            Self::MarkedCompleted => "Marked Completed",
        }
    }
}

/// A finished download, published to whoever post-processes files
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedDownload {
    pub url: Url,
    pub referer: Url,
    pub origin: Url,
    pub parents: Vec<Url>,
    pub path: PathBuf,
    pub size: u64,
    /// Default-algorithm digest when hashed in place
    pub hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

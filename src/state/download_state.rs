//! Download state definitions for a single media item
//!
//! A media item moves `Queued -> Connecting -> Transferring` and ends in one
//! of the terminal states. `FailedRetryable` is the only state that may go
//! back to `Queued`.
use std::fmt;

/// Represents the current state of a media item in the Download Manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    // ===== Active States =====
    /// Waiting for limiter slots
    Queued,

    /// Request sent, waiting for response headers
    Connecting,

    /// Writing the response body to the `.part` file
    Transferring,

    // ===== Terminal States =====
    /// Final file in place and recorded in history
    Completed,

    /// Failed, may be attempted again
    FailedRetryable,

    /// Failed for good (dead link, refused content)
    FailedPermanent,

    /// Not attempted (already downloaded, filtered out)
    Skipped,
}

impl DownloadState {
    /// Returns true if no further processing happens in this state
    ///
    /// `FailedRetryable` is terminal for one attempt only; the Download
    /// Manager decides whether it re-enters `Queued`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Connecting | Self::Transferring)
    }

    /// Returns true if this represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedRetryable | Self::FailedPermanent)
    }

    /// Checks whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: DownloadState) -> bool {
        use DownloadState::*;
        match (self, next) {
            (Queued, Connecting) | (Queued, Skipped) | (Queued, FailedRetryable) => true,
            (Queued, FailedPermanent) => true,
            (Connecting, Transferring) | (Connecting, Skipped) => true,
            (Connecting, FailedRetryable) | (Connecting, FailedPermanent) => true,
            (Transferring, Completed) => true,
            (Transferring, FailedRetryable) | (Transferring, FailedPermanent) => true,
            (FailedRetryable, Queued) => true,
            _ => false,
        }
    }

    /// Converts the state to its string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Connecting => "connecting",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedPermanent => "failed_permanent",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a state from its string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "connecting" => Some(Self::Connecting),
            "transferring" => Some(Self::Transferring),
            "completed" => Some(Self::Completed),
            "failed_retryable" => Some(Self::FailedRetryable),
            "failed_permanent" => Some(Self::FailedPermanent),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

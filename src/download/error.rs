use crate::ErrorClass;
use thiserror::Error;

/// Why one transfer attempt failed
///
/// These never abort a run; the Download Manager turns the class of the
/// error into an [`Outcome`](crate::download::Outcome).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DownloadError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Rate limited by host")]
    RateLimited,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out waiting for data")]
    Timeout,

    #[error("Transfer stayed below {floor} B/s for {window} seconds")]
    SlowDownload { floor: u64, window: u64 },

    #[error("Server sent an empty file")]
    EmptyBody,

    #[error("Server sent {0} instead of a file")]
    InvalidContentType(String),

    #[error("Partial file does not match the remote file")]
    RangeNotSatisfiable,

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("{available} bytes free, {required} required")]
    InsufficientFreeSpace { required: u64, available: u64 },

    #[error("URL is a known placeholder ({0})")]
    KnownBadUrl(u16),

    #[error("IO error: {0}")]
    Io(String),
}

impl DownloadError {
    /// How the Download Manager reacts to this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http { status } => classify_status(*status),
            Self::RateLimited
            | Self::Connection(_)
            | Self::Timeout
            | Self::SlowDownload { .. }
            | Self::EmptyBody => ErrorClass::Transient,
            Self::InvalidContentType(_) | Self::KnownBadUrl(_) => ErrorClass::Permanent,
            Self::RangeNotSatisfiable | Self::ChecksumMismatch { .. } => ErrorClass::Integrity,
            Self::InsufficientFreeSpace { .. } | Self::Io(_) => ErrorClass::Resource,
        }
    }

    /// Short label used in the error logs and the run report
    pub fn reason(&self) -> String {
        match self {
            Self::Http { status } => status.to_string(),
            Self::RateLimited => "429 Rate Limited".to_string(),
            Self::Connection(_) => "Connection Error".to_string(),
            Self::Timeout => "Timeout".to_string(),
            Self::SlowDownload { .. } => "Slow Download".to_string(),
            Self::EmptyBody => "File Is Empty".to_string(),
            Self::InvalidContentType(_) => "Invalid Content Type".to_string(),
            Self::RangeNotSatisfiable => "Bad Partial File".to_string(),
            Self::ChecksumMismatch { .. } => "Checksum Mismatch".to_string(),
            Self::InsufficientFreeSpace { .. } => "Insufficient Free Space".to_string(),
            Self::KnownBadUrl(status) => format!("{} Known Bad URL", status),
            Self::Io(_) => "IO Error".to_string(),
        }
    }
}

/// Class of a non-success HTTP status
///
/// Dead links and refusals are permanent; server trouble and anything
/// asking the client to slow down is transient.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 425 | 429 | 500..=599 => ErrorClass::Transient,
        416 => ErrorClass::Integrity,
        _ => ErrorClass::Permanent,
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Connection(e.to_string())
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

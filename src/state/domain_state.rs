use std::time::{Duration, Instant};

/// Tracks download pacing for one host
///
/// Concurrency slots alone do not stop a burst of downloads from starting at
/// the same instant; this state enforces the minimum spacing between two
/// download starts on the same host.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// When the last download on this host was allowed to start
    pub last_download_time: Option<Instant>,

    /// Set after the host answered HTTP 429
    pub rate_limited: bool,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the next download may start
    ///
    /// Returns None if a download can start now.
    pub fn time_until_next_download(&self, spacing: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_download_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < spacing {
            Some(spacing - elapsed)
        } else {
            None
        }
    }

    /// Records that a download started on this host
    pub fn record_download(&mut self, now: Instant) {
        self.last_download_time = Some(now);
    }

    /// Marks this host as rate limited
    pub fn mark_rate_limited(&mut self) {
        self.rate_limited = true;
    }
}

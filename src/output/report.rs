//! End-of-run report
//!
//! Failures are counted by reason rather than listed by URL, so one host
//! failing everything shows up as a single large line.

use crate::download::{Outcome, SkipReason};
use crate::hashing::HashStats;
use std::collections::HashMap;
use std::time::Duration;

/// Totals of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub completed: u64,
    pub completed_bytes: u64,
    /// Skipped downloads by reason
    pub skipped: HashMap<String, u64>,
    /// Failed downloads by reason
    pub failed: HashMap<String, u64>,
    /// Failed scrapes by reason
    pub scrape_failures: HashMap<String, u64>,
    pub unsupported: u64,
    /// Downloads a dry run would have started
    pub planned: u64,
    /// Children dropped by the children limit, depth or thread depth
    pub truncated: u64,
    pub dedup_removed: u64,
    pub hashes: HashStats,
    pub rate_limited_sites: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn record_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Completed(done) => {
                self.completed += 1;
                self.completed_bytes += done.size;
            }
            Outcome::Skipped(reason) => bump(&mut self.skipped, reason.as_str()),
            Outcome::RetryableFailure(e) | Outcome::PermanentFailure(e) => {
                bump(&mut self.failed, &e.reason())
            }
        }
    }

    /// Files a crawler left out because history has them completed
    pub fn record_previously_completed(&mut self, count: u64) {
        if count > 0 {
            *self
                .skipped
                .entry(SkipReason::AlreadyDownloaded.as_str().to_string())
                .or_insert(0) += count;
        }
    }

    pub fn record_scrape_failure(&mut self, reason: &str) {
        bump(&mut self.scrape_failures, reason);
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }

    pub fn total_scrape_failures(&self) -> u64 {
        self.scrape_failures.values().sum()
    }
}

fn bump(counts: &mut HashMap<String, u64>, reason: &str) {
    *counts.entry(reason.to_string()).or_insert(0) += 1;
}

/// Reasons ordered by count (descending), then by name
pub fn by_frequency(counts: &HashMap<String, u64>) -> Vec<(&str, u64)> {
    let mut sorted: Vec<(&str, u64)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

/// Prints the report to stdout in a formatted manner
pub fn print_report(report: &RunReport) {
    println!("=== Run Report ===\n");

    println!("Downloads:");
    println!(
        "  Completed: {} ({:.1} MiB)",
        report.completed,
        report.completed_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("  Skipped: {}", report.total_skipped());
    println!("  Failed: {}", report.total_failed());
    if report.planned > 0 {
        println!("  Planned (dry run): {}", report.planned);
    }
    println!();

    print_section("Skip Reasons", &report.skipped);
    print_section("Download Failures", &report.failed);
    print_section("Scrape Failures", &report.scrape_failures);

    if report.unsupported > 0 || report.truncated > 0 {
        println!("Not Scraped:");
        println!("  Unsupported URLs: {}", report.unsupported);
        println!("  Dropped by limits: {}", report.truncated);
        println!();
    }

    if report.hashes.computed > 0 || report.hashes.reused > 0 || report.dedup_removed > 0 {
        println!("Hashing:");
        println!("  Computed: {}", report.hashes.computed);
        println!("  Reused: {}", report.hashes.reused);
        println!("  Duplicates removed: {}", report.dedup_removed);
        println!();
    }

    if !report.rate_limited_sites.is_empty() {
        println!("Rate Limited Sites ({}):", report.rate_limited_sites.len());
        for site in &report.rate_limited_sites {
            println!("  - {}", site);
        }
        println!();
    }

    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
}

fn print_section(title: &str, counts: &HashMap<String, u64>) {
    if counts.is_empty() {
        return;
    }
    println!("{}:", title);
    for (reason, count) in by_frequency(counts) {
        println!("  {}: {}", reason, count);
    }
    println!();
}

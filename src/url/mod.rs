//! URL handling module for Sumi-Harvest
//!
//! This module provides input URL normalization, host extraction and wildcard
//! matching, the keys the history store uses, and file name helpers.

mod filename;
mod hosts;
mod keys;
mod normalize;

pub use filename::{filename_from_url, iterate_filename, sanitize_filename, split_extension};
pub use hosts::{extract_domain, matches_any, matches_wildcard, site_key_for};
pub use keys::{has_password, history_path, referer_key};
pub use normalize::normalize_input_url;

/// Hosts that are never scraped or downloaded
pub const BLOCKED_DOMAINS: &[&str] = &["facebook", "instagram", "fbcdn"];

/// Returns true if the host belongs to a blocked site
pub fn is_blocked_domain(host: &str) -> bool {
    BLOCKED_DOMAINS.iter().any(|blocked| host.contains(blocked))
}

//! State module for tracking download progress
//!
//! # Components
//!
//! - `DownloadState`: the per-item state machine driven by the Download Manager
//! - `DomainState`: per-host spacing between download starts

mod domain_state;
mod download_state;

pub use domain_state::DomainState;
pub use download_state::DownloadState;

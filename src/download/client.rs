//! HTTP clients for pages and files

use crate::config::{GeneralConfig, RateLimitingConfig};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// Builds the client crawlers use to fetch pages
///
/// # Arguments
///
/// * `general` - Supplies the user agent
/// * `rate_limiting` - Supplies the connection timeout; the read timeout
///   bounds a whole page request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    general: &GeneralConfig,
    rate_limiting: &RateLimitingConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(&general.user_agent)
        .connect_timeout(Duration::from_secs(rate_limiting.connection_timeout))
        .timeout(Duration::from_secs(rate_limiting.read_timeout))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the client the Download Manager streams files with
///
/// No overall timeout (large files take as long as they take) and no
/// transparent decompression, so byte offsets on disk match the byte
/// offsets used in `Range` requests. Stalled reads are caught per chunk.
pub fn build_download_client(
    general: &GeneralConfig,
    rate_limiting: &RateLimitingConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(&general.user_agent)
        .connect_timeout(Duration::from_secs(rate_limiting.connection_timeout))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .no_gzip()
        .no_brotli()
        .build()
}

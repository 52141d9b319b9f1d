use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameters that only track where a link was clicked
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a user-supplied or crawler-discovered URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an `http` or `https` scheme
/// 3. Require a host (the parser lowercases it)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters, keeping everything else in order
///
/// Other query parameters are kept verbatim: file hosts encode passwords and
/// file identifiers there.
///
/// ```
/// use sumi_harvest::url::normalize_input_url;
///
/// let url = normalize_input_url("https://Files.Example.com/a/b?utm_source=x&id=3#top").unwrap();
/// assert_eq!(url.as_str(), "https://files.example.com/a/b?id=3");
/// ```
pub fn normalize_input_url(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

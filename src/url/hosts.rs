use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://CDN.Example.com/file.jpg").unwrap();
/// assert_eq!(extract_domain(&url), Some("cdn.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a host matches a wildcard pattern
///
/// * `"example.com"` matches only `example.com`
/// * `"*.example.com"` matches `example.com` and any subdomain of it
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "media.example.com"));
/// assert!(!matches_wildcard("example.com", "media.example.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true if the host matches any pattern in the list
pub fn matches_any(patterns: &[String], host: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, host))
}

/// Finds the site key for a host among known keys
///
/// Site keys are bare names such as `"bunkr"` or full hosts such as
/// `"nhentai.net"`. The longest key contained in the host wins, so
/// `"bunkrr"` is preferred over `"bunkr"` for `cdn.bunkrr.su`.
pub fn site_key_for<'a, I>(host: &str, keys: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter(|key| host.contains(key))
        .max_by_key(|key| key.len())
}

//! History keys derived from URLs
//!
//! The history store identifies a file by `(domain, path)` and records the
//! page it was found on by its referer key. Password-qualified URLs keep the
//! password in their key so they never collide with the bare URL.

use url::Url;

/// Query parameter names that carry an access password
const PASSWORD_PARAMS: &[&str] = &["password", "pwd", "pass"];

/// Path component of a history key
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::history_path;
///
/// let plain = Url::parse("https://host.com/f/abc?dl=1").unwrap();
/// assert_eq!(history_path(&plain), "/f/abc");
///
/// let locked = Url::parse("https://host.com/f/abc?password=x").unwrap();
/// assert_eq!(history_path(&locked), "/f/abc?password=x");
/// ```
pub fn history_path(url: &Url) -> String {
    match url.query() {
        Some(query) if has_password(url) => format!("{}?{}", url.path(), query),
        _ => url.path().to_string(),
    }
}

/// Referer key: the full URL without its fragment
pub fn referer_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Returns true if the URL carries a password query parameter
pub fn has_password(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, value)| PASSWORD_PARAMS.contains(&key.as_ref()) && !value.is_empty())
}

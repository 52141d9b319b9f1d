use std::path::{Path, PathBuf};
use url::Url;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\''];

/// Replaces characters that are invalid in file names on common platforms
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) || c.is_control() { '-' } else { c })
        .collect();
    cleaned.trim().trim_end_matches('.').to_string()
}

/// Takes a file name from the last path segment of a URL
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = segment.replace("%20", " ");
    let name = sanitize_filename(&decoded);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Splits a file name into stem and lowercase extension (with the dot)
///
/// ```
/// use sumi_harvest::url::split_extension;
///
/// assert_eq!(split_extension("Clip.MP4"), ("Clip".to_string(), Some(".mp4".to_string())));
/// assert_eq!(split_extension("README"), ("README".to_string(), None));
/// ```
pub fn split_extension(name: &str) -> (String, Option<String>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => (
            name[..idx].to_string(),
            Some(name[idx..].to_lowercase()),
        ),
        _ => (name.to_string(), None),
    }
}

/// Returns `path` if unused, otherwise the first free `stem (n).ext`
pub fn iterate_filename(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&name);
    let ext = ext.unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = parent.join(format!("{} ({}){}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

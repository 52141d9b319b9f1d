//! File type and size filters

use crate::config::{FileSizeLimits, IgnoreOptions};

pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".gif", ".gifv", ".heic", ".jfif", ".jif", ".jpe", ".jpeg", ".jpg", ".jxl", ".png", ".svg",
    ".tif", ".tiff", ".webp",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".3gp", ".avchd", ".avi", ".f4v", ".flv", ".m2ts", ".m4p", ".m4v", ".mkv", ".mov", ".mp2",
    ".mp4", ".mpe", ".mpeg", ".mpg", ".mpv", ".mts", ".ogg", ".ogv", ".qt", ".swf", ".ts",
    ".webm", ".wmv",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[".flac", ".m4a", ".mka", ".mp3", ".wav"];

pub const TEXT_EXTENSIONS: &[&str] = &[".htm", ".html", ".md", ".nfo", ".txt"];

pub const ARCHIVE_EXTENSIONS: &[&str] = &[".7z", ".bz2", ".gz", ".tar", ".zip", ".rar"];

/// Extension sets by category
pub const FILE_FORMATS: &[(MediaKind, &[&str])] = &[
    (MediaKind::Image, IMAGE_EXTENSIONS),
    (MediaKind::Video, VIDEO_EXTENSIONS),
    (MediaKind::Audio, AUDIO_EXTENSIONS),
    (MediaKind::Text, TEXT_EXTENSIONS),
    (MediaKind::Archive, ARCHIVE_EXTENSIONS),
];

/// Category of a file, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Text,
    Archive,
    Other,
}

impl MediaKind {
    /// Classifies a lowercase extension with the dot
    pub fn from_extension(ext: Option<&str>) -> Self {
        let Some(ext) = ext else {
            return Self::Other;
        };
        FILE_FORMATS
            .iter()
            .find(|(_, exts)| exts.contains(&ext))
            .map(|(kind, _)| *kind)
            .unwrap_or(Self::Other)
    }

    /// Images, videos and audio
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio)
    }
}

/// Returns false if the ignore options exclude this file type
pub fn check_allowed_filetype(kind: MediaKind, ignore: &IgnoreOptions) -> bool {
    match kind {
        MediaKind::Image => !ignore.exclude_images,
        MediaKind::Video => !ignore.exclude_videos,
        MediaKind::Audio => !ignore.exclude_audio,
        MediaKind::Text | MediaKind::Archive | MediaKind::Other => !ignore.exclude_other,
    }
}

/// `(minimum, maximum)` bounds for a file type, 0 meaning none
pub fn size_bounds(kind: MediaKind, limits: &FileSizeLimits) -> (u64, u64) {
    match kind {
        MediaKind::Image => (limits.minimum_image_size, limits.maximum_image_size),
        MediaKind::Video => (limits.minimum_video_size, limits.maximum_video_size),
        _ => (limits.minimum_other_size, limits.maximum_other_size),
    }
}

/// Returns true if the file type has any size bound
pub fn has_size_limits(kind: MediaKind, limits: &FileSizeLimits) -> bool {
    size_bounds(kind, limits) != (0, 0)
}

/// Returns false if `size` falls outside the configured bounds
pub fn check_filesize_limits(kind: MediaKind, size: u64, limits: &FileSizeLimits) -> bool {
    let (min, max) = size_bounds(kind, limits);
    (min == 0 || size >= min) && (max == 0 || size <= max)
}

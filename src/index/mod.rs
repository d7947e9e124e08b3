//! Media indexing module
//!
//! This module enumerates the media files that are served:
//! - Confined, depth-first walk of the media root (no symlinks followed)
//! - Hidden (dot-prefixed) files and directories skipped
//! - Extension allow-list of common audio and video containers
//! - Deterministic, lexical ordering

pub mod scanner;

pub use scanner::scan_directory;

use std::fmt;
use std::path::Path;

/// File extensions (lowercase, without the dot) that are considered media.
pub const MEDIA_EXTENSIONS: [&str; 21] = [
    "webm", "mkv", "ogv", "ogg", "avi", "mov", "wmv", "mp4", "m4p", "m4v", "mpg", "mpeg", "flv",
    "aac", "aiff", "flac", "m4a", "mp3", "oga", "opus", "wav",
];

/// Check whether a path has one of the allowed media extensions.
/// The comparison is case-insensitive.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// A media file, as a `/`-separated path relative to the media root.
///
/// The same string is used for the `/files/` URL and for the playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFile(String);

impl MediaFile {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self(relative_path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MediaFile {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

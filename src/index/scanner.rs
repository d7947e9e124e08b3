//! Directory scanner - walks the media root and yields media file paths

use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::error::{KubaruError, Result};

use super::{is_media_file, MediaFile};

type VisibleEntries = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// Iterator over the media files below a root directory.
///
/// The walk is depth-first in lexical order per directory and never follows
/// symbolic links, so it cannot leave the root. It is consumed once.
pub struct MediaWalker {
    root: PathBuf,
    entries: VisibleEntries,
}

impl MediaWalker {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let entries = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool);
        Self { root, entries }
    }

    /// Convert a walk entry into a root-relative, `/`-separated path.
    /// Returns `Ok(None)` for names that are not valid UTF-8.
    fn relative(&self, entry: &DirEntry) -> Result<Option<MediaFile>> {
        let relative = entry
            .path()
            .strip_prefix(&self.root)
            .map_err(|_| KubaruError::PathEscape(entry.path().to_path_buf()))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(name) => parts.push(name),
                    None => {
                        tracing::warn!("Skipping non UTF-8 path: {:?}", entry.path());
                        return Ok(None);
                    }
                },
                _ => return Err(KubaruError::PathEscape(entry.path().to_path_buf())),
            }
        }

        Ok(Some(MediaFile::new(parts.join("/"))))
    }
}

impl Iterator for MediaWalker {
    type Item = Result<MediaFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            // Symlinks report their own type here, so they never pass.
            if !entry.file_type().is_file() || !is_media_file(entry.path()) {
                continue;
            }

            match self.relative(&entry) {
                Ok(Some(file)) => return Some(Ok(file)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// Hidden files are skipped, hidden directories are pruned with their subtree.
fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Scan a media root and collect all media files.
///
/// An empty directory is not an error, but it is worth a warning.
pub fn scan_directory<P: AsRef<Path>>(root: P) -> Result<Vec<MediaFile>> {
    let root = root.as_ref();
    let files = MediaWalker::new(root).collect::<Result<Vec<_>>>()?;

    if files.is_empty() {
        tracing::warn!("{:?} does not contain any media files", root);
    } else {
        tracing::info!("Indexed {} media files in {:?}", files.len(), root);
    }

    Ok(files)
}

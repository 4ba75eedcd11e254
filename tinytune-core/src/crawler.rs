//! Filesystem crawling.
//!
//! [`scan`] walks the data directory depth-first and produces one
//! [`FileInfo`] per filesystem item, skipping the root itself and any
//! explicitly excluded absolute path (the catalog file hides itself this
//! way). Symlinks are followed; cycles are the caller's responsibility.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::error::CrawlError;

/// Descriptor for a single crawled filesystem item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub absolute_path: PathBuf,
    /// Slash-joined path below the crawl root, the catalog's secondary key.
    pub relative_path: String,
    pub name: String,
    /// Modification time in unix seconds.
    pub mod_time: i64,
    pub size: u64,
    pub is_dir: bool,
}

/// Walk `root` and return a descriptor for every item below it.
///
/// Fails fast with [`CrawlError::DirNotFound`] when the root is missing or
/// not a directory; any stat failure below the root aborts the whole scan.
/// Partial results are never returned.
pub fn scan(root: &Path, exclude: &[PathBuf]) -> Result<Vec<FileInfo>, CrawlError> {
    let root_meta =
        std::fs::metadata(root).map_err(|_| CrawlError::DirNotFound(root.to_path_buf()))?;
    if !root_meta.is_dir() {
        return Err(CrawlError::DirNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();

    for item in WalkDir::new(root).follow_links(true) {
        let item = item?;
        if item.path() == root {
            continue;
        }
        if exclude.iter().any(|excluded| excluded == item.path()) {
            continue;
        }

        let meta = item.metadata()?;
        let Ok(relative) = item.path().strip_prefix(root) else {
            continue;
        };

        files.push(FileInfo {
            absolute_path: item.path().to_path_buf(),
            relative_path: slash_join(relative),
            name: item.file_name().to_string_lossy().into_owned(),
            mod_time: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            size: meta.len(),
            is_dir: meta.is_dir(),
        });
    }

    Ok(files)
}

fn slash_join(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

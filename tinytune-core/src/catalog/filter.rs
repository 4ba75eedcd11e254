//! Preview exclusion prefilter.

use std::collections::HashSet;

use regex::Regex;

use crate::crawler::FileInfo;

/// Relative paths whose preview generation should be skipped: everything
/// an exclude pattern matches, minus everything an include pattern
/// re-admits. Directories never enter the set. Entries are still created
/// for excluded files; only thumbnail production is suppressed.
pub fn excluded_files(
    files: &[FileInfo],
    includes: &[Regex],
    excludes: &[Regex],
) -> HashSet<String> {
    let mut excluded = matching_paths(files, excludes);
    for included in matching_paths(files, includes) {
        excluded.remove(&included);
    }
    excluded
}

fn matching_paths(files: &[FileInfo], patterns: &[Regex]) -> HashSet<String> {
    files
        .iter()
        .filter(|file| !file.is_dir)
        .filter(|file| patterns.iter().any(|p| p.is_match(&file.relative_path)))
        .map(|file| file.relative_path.clone())
        .collect()
}

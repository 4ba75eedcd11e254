//! Catalog entry records and content classification.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crawler::FileInfo;

const IMAGE_FORMATS: [&str; 6] = ["jpeg", "jpg", "png", "webp", "bmp", "gif"];
const VIDEO_FORMATS: [&str; 15] = [
    "3gp", "avi", "f4v", "flv", "hevc", "m4v", "mlv", "mov", "mp4", "m4a", "3g2", "mj2", "mpeg",
    "ogv", "webm",
];

/// Content classification, stored by its numeric value in the catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ContentKind {
    Video = 1,
    Image = 2,
    Other = 3,
    Dir = 4,
}

impl ContentKind {
    /// Classify a lowercased extension (without the dot).
    pub fn from_extension(extension: &str) -> Self {
        if IMAGE_FORMATS.contains(&extension) {
            ContentKind::Image
        } else if VIDEO_FORMATS.contains(&extension) {
            ContentKind::Video
        } else {
            ContentKind::Other
        }
    }

    /// Wire value used by the catalog file and the "Type" sort order.
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl From<ContentKind> for u8 {
    fn from(kind: ContentKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ContentKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ContentKind::Video),
            2 => Ok(ContentKind::Image),
            3 => Ok(ContentKind::Other),
            4 => Ok(ContentKind::Dir),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// Pixel dimensions of the original media item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Byte range of an entry's preview inside the catalog blob.
///
/// `length == 0` means the entry has no preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLocation {
    pub length: u32,
    pub offset: u32,
}

/// One catalog record, corresponding to one filesystem item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub name: String,
    /// Modification time in unix seconds; part of the id derivation.
    pub mod_time: i64,
    pub origin_size: u64,
    pub is_dir: bool,
    pub extension: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Seconds; nonzero only for videos whose preview succeeded.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub preview: PreviewLocation,
}

impl Entry {
    /// Build an entry from a crawl descriptor, deriving id, extension
    /// and content kind.
    pub fn from_file(file: &FileInfo) -> Self {
        let extension = extension_of(&file.name);
        let kind = if file.is_dir {
            ContentKind::Dir
        } else {
            ContentKind::from_extension(&extension)
        };

        Entry {
            id: derive_id(&file.relative_path, file.mod_time),
            absolute_path: file.absolute_path.clone(),
            relative_path: file.relative_path.clone(),
            name: file.name.clone(),
            mod_time: file.mod_time,
            origin_size: file.size,
            is_dir: file.is_dir,
            extension,
            kind,
            duration: 0.0,
            resolution: Resolution::default(),
            preview: PreviewLocation::default(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == ContentKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.kind == ContentKind::Video
    }

    pub fn is_animated_image(&self) -> bool {
        self.kind == ContentKind::Image && self.extension == "gif"
    }
}

/// Stable 10-hex-character identifier: the first 5 bytes of
/// `SHA-256(relative_path || mod_time)`.
pub fn derive_id(relative_path: &str, mod_time: i64) -> String {
    let digest = Sha256::digest(format!("{relative_path}{mod_time}").as_bytes());
    digest[..5].iter().map(|b| format!("{b:02x}")).collect()
}

/// Lowercased final extension of a file name, without the dot.
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(relative_path: &str, is_dir: bool) -> FileInfo {
        FileInfo {
            absolute_path: PathBuf::from("/data").join(relative_path),
            relative_path: relative_path.to_string(),
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            mod_time: 1700000000,
            size: 42,
            is_dir,
        }
    }

    #[test]
    fn id_is_stable_and_ten_hex_chars() {
        let a = derive_id("photo.jpg", 1700000000);
        let b = derive_id("photo.jpg", 1700000000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn id_changes_with_mod_time() {
        assert_ne!(
            derive_id("photo.jpg", 1700000000),
            derive_id("photo.jpg", 1700000001)
        );
    }

    #[test]
    fn id_matches_sha256_prefix() {
        let digest = Sha256::digest(b"photo.jpg1700000000");
        let expected: String = digest[..5].iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(derive_id("photo.jpg", 1700000000), expected);
    }

    #[test]
    fn classification_follows_extension() {
        assert_eq!(ContentKind::from_extension("jpg"), ContentKind::Image);
        assert_eq!(ContentKind::from_extension("gif"), ContentKind::Image);
        assert_eq!(ContentKind::from_extension("mp4"), ContentKind::Video);
        assert_eq!(ContentKind::from_extension("flv"), ContentKind::Video);
        assert_eq!(ContentKind::from_extension("pdf"), ContentKind::Other);
        assert_eq!(ContentKind::from_extension(""), ContentKind::Other);
    }

    #[test]
    fn extension_is_lowercased_last_segment() {
        assert_eq!(extension_of("MOVIE.MP4"), "mp4");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn directories_short_circuit_to_dir() {
        let entry = Entry::from_file(&file("clips.mp4", true));
        assert_eq!(entry.kind, ContentKind::Dir);
        assert!(entry.is_dir);
    }

    #[test]
    fn gif_is_an_animated_image() {
        let entry = Entry::from_file(&file("loop.gif", false));
        assert!(entry.is_image());
        assert!(entry.is_animated_image());

        let still = Entry::from_file(&file("photo.png", false));
        assert!(!still.is_animated_image());
    }
}

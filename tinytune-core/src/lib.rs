//! # Tinytune Core
//!
//! Catalog engine for the tinytune media server.
//!
//! The engine turns a directory tree of images and videos into a single
//! binary catalog file: every filesystem item gets a stable identifier,
//! a classified content kind and, for media, an inline thumbnail with
//! derived dimensions and duration. The catalog is queried by the HTTP
//! layer for browsing, search and preview retrieval, and the [`hls`]
//! module synthesizes VOD playlists and transcoded chunks from a video's
//! duration alone.
//!
//! Subsystems:
//! - [`crawler`] walks the data directory and produces file descriptors
//! - [`preview`] renders thumbnails and video collages through ffmpeg
//! - [`catalog`] holds the entry store, the on-disk codec and the
//!   concurrent index builder
//! - [`hls`] maps a video duration onto 10-second playback chunks

pub mod catalog;
pub mod crawler;
pub mod error;
pub mod hls;
pub mod preview;
pub mod timefmt;

pub use catalog::builder::Builder;
pub use catalog::entry::{ContentKind, Entry, PreviewLocation, Resolution};
pub use catalog::sort::SortOrder;
pub use catalog::{Catalog, CatalogStat};
pub use crawler::{scan, FileInfo};
pub use error::{CatalogError, CrawlError, HlsError, PreviewError};
pub use preview::{Acceleration, PreviewData, Previewer, PreviewerOptions};

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while walking the data directory.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("walk failed: {0}")]
    WalkFailed(#[from] walkdir::Error),
}

/// Errors produced by the catalog store, codec and builder.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("not found")]
    NotFound,

    #[error("invalid catalog header: {0:?}")]
    InvalidHeader(Vec<u8>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Errors produced by the preview pipelines.
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("'{0}' not found")]
    ToolMissing(String),

    #[error("{tool} version {found} is outdated, {required}+ is required")]
    VersionTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("failed to parse {tool} version from: {output}")]
    VersionUnparsable { tool: String, output: String },

    #[error("there are no supported hardware decoders")]
    NoHardwareDecoders,

    #[error("subprocess failed [{stderr}]")]
    Subprocess { stderr: String },

    #[error("failed to decode media info: {0}")]
    ProbeDecode(#[from] serde_json::Error),

    #[error("failed to parse duration from media info")]
    DurationParse,

    #[error("video stream not found")]
    NoVideoStream,

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("preview cancelled")]
    Cancelled,

    #[error("preview timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by HLS playlist and chunk synthesis.
#[derive(Error, Debug)]
pub enum HlsError {
    #[error("failed to parse chunk index: {0}")]
    ParseChunkIndex(String),

    #[error("ffmpeg command failed [{stderr}]")]
    Ffmpeg { stderr: String },

    #[error("chunk transcode timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! CLI surface and configuration assembly.
//!
//! [`Args`] is the raw clap-parsed command line; [`Config`] is the
//! validated form the server runs on. Size limits accept `B/KB/MB/GB/TB`
//! suffixes, the timeout accepts humantime strings (`90s`, `10m`) and
//! the selector lists are comma-separated regexes compiled once here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::{ArgAction, Parser, ValueEnum};
use regex::Regex;
use tracing::info;

use tinytune_core::Acceleration;

#[derive(Parser, Debug)]
#[command(name = "tinytune")]
#[command(about = "Media library indexer and preview server")]
pub struct Args {
    /// Media library root; defaults to the working directory
    #[arg(env = "TINYTUNE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Produce video previews
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub video: bool,

    /// Produce image previews
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub image: bool,

    /// Hardware acceleration policy for video decoding
    #[arg(long, value_enum, default_value = "auto")]
    pub acceleration: AccelMode,

    /// Write the catalog back to disk when it changed
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub index_save: bool,

    /// Drop catalog entries whose files vanished and compact the blob
    #[arg(long, action = ArgAction::SetTrue)]
    pub remove_stale: bool,

    /// Most image previews to produce this run, -1 for unlimited
    #[arg(long, default_value_t = -1)]
    pub max_images: i64,

    /// Most video previews to produce this run, -1 for unlimited
    #[arg(long, default_value_t = -1)]
    pub max_videos: i64,

    /// Largest file to preview (accepts B/KB/MB/GB/TB suffixes)
    #[arg(long, default_value = "")]
    pub max_file_size: String,

    /// Preview worker count
    #[arg(long, default_value_t = default_parallel())]
    pub parallel: usize,

    /// Comma-separated regexes re-admitting excluded paths
    #[arg(long, default_value = "")]
    pub includes: String,

    /// Comma-separated regexes excluding paths from previews
    #[arg(long, default_value = "")]
    pub excludes: String,

    /// Comma-separated regexes for files played through HLS
    #[arg(long, default_value = "")]
    pub streaming: String,

    /// Per-file preview deadline (humantime string)
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// HTTP listen port
    #[arg(long, short, env = "TINYTUNE_PORT", default_value_t = 8080)]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AccelMode {
    Auto,
    Software,
    Hardware,
}

impl From<AccelMode> for Acceleration {
    fn from(mode: AccelMode) -> Acceleration {
        match mode {
            AccelMode::Auto => Acceleration::Auto,
            AccelMode::Software => Acceleration::Software,
            AccelMode::Hardware => Acceleration::Hardware,
        }
    }
}

/// Per-media-kind processing switch and budget.
#[derive(Debug, Clone, Copy)]
pub struct MediaTypeConfig {
    pub process: bool,
    pub max_items: i64,
}

/// Everything the indexing phase needs.
#[derive(Debug)]
pub struct ProcessConfig {
    pub parallel: usize,
    pub image: MediaTypeConfig,
    pub video: MediaTypeConfig,
    pub acceleration: Acceleration,
    pub includes: Vec<Regex>,
    pub excludes: Vec<Regex>,
    pub max_file_size: i64,
    pub timeout: Duration,
}

/// Validated runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub index_save: bool,
    pub remove_stale: bool,
    pub streaming: Vec<Regex>,
    pub process: ProcessConfig,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Config> {
        let data_dir = match args.data_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to resolve working directory")?,
        };

        Ok(Config {
            data_dir,
            port: args.port,
            index_save: args.index_save,
            remove_stale: args.remove_stale,
            streaming: parse_regex_list(&args.streaming).context("invalid --streaming pattern")?,
            process: ProcessConfig {
                parallel: args.parallel.max(1),
                image: MediaTypeConfig {
                    process: args.image,
                    max_items: args.max_images,
                },
                video: MediaTypeConfig {
                    process: args.video,
                    max_items: args.max_videos,
                },
                acceleration: args.acceleration.into(),
                includes: parse_regex_list(&args.includes).context("invalid --includes pattern")?,
                excludes: parse_regex_list(&args.excludes).context("invalid --excludes pattern")?,
                max_file_size: parse_size(&args.max_file_size)
                    .context("invalid --max-file-size value")?,
                timeout: args.timeout,
            },
        })
    }

    /// Log the effective configuration, mirroring what the flags resolved to.
    pub fn log_summary(&self) {
        info!(
            dir = %self.data_dir.display(),
            port = self.port,
            index_save = self.index_save,
            remove_stale = self.remove_stale,
            "config"
        );
        info!(
            parallel = self.process.parallel,
            acceleration = ?self.process.acceleration,
            timeout = ?self.process.timeout,
            "processing"
        );
        log_media("image", &self.process.image);
        log_media("video", &self.process.video);
        if self.process.max_file_size != -1 {
            info!(
                max_file_size = %ByteSize::b(self.process.max_file_size as u64),
                "size limit"
            );
        }
    }
}

fn log_media(name: &'static str, config: &MediaTypeConfig) {
    if config.max_items == -1 {
        info!(processing = config.process, "{name}");
    } else {
        info!(
            processing = config.process,
            max_items = config.max_items,
            "{name}"
        );
    }
}

fn default_parallel() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

/// Compile a comma-separated regex list; an empty string is an empty list.
fn parse_regex_list(list: &str) -> Result<Vec<Regex>> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|pattern| Regex::new(pattern).with_context(|| format!("pattern {pattern:?}")))
        .collect()
}

/// Parse a byte-size string with optional suffix; empty means unlimited.
fn parse_size(value: &str) -> Result<i64> {
    if value.is_empty() {
        return Ok(-1);
    }
    let size: ByteSize = value
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .with_context(|| format!("size {value:?}"))?;
    Ok(size.as_u64() as i64)
}

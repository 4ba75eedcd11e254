//! External tool probing and media introspection.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::PreviewError;

const REQUIRED_VERSION: (u64, u64, u64) = (4, 4, 2);

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version\s+n?(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version pattern")
});

static CUDA_CODEC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(codec\s+(\w+)\)").expect("valid codec pattern"));

/// Verify that ffmpeg and ffprobe are present and recent enough.
pub(crate) async fn require_tools() -> Result<(), PreviewError> {
    require_version("ffmpeg").await?;
    require_version("ffprobe").await?;
    Ok(())
}

async fn require_version(tool: &str) -> Result<(), PreviewError> {
    let output = Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|_| PreviewError::ToolMissing(tool.to_string()))?;
    if !output.status.success() {
        return Err(PreviewError::ToolMissing(tool.to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let found = parse_version(&stdout).ok_or_else(|| PreviewError::VersionUnparsable {
        tool: tool.to_string(),
        output: stdout.lines().next().unwrap_or_default().to_string(),
    })?;

    if found < REQUIRED_VERSION {
        let (major, minor, patch) = found;
        let (req_major, req_minor, req_patch) = REQUIRED_VERSION;
        return Err(PreviewError::VersionTooOld {
            tool: tool.to_string(),
            found: format!("{major}.{minor}.{patch}"),
            required: format!("{req_major}.{req_minor}.{req_patch}"),
        });
    }
    Ok(())
}

fn parse_version(output: &str) -> Option<(u64, u64, u64)> {
    let captures = VERSION_PATTERN.captures(output)?;
    let part = |i: usize| {
        captures
            .get(i)
            .map_or(Some(0), |m| m.as_str().parse().ok())
    };
    Some((part(1)?, part(2)?, part(3)?))
}

/// Codecs the local Nvidia decoders support, from `ffprobe -decoders`.
pub(crate) async fn cuda_decoders() -> Result<Vec<String>, PreviewError> {
    let output = Command::new("ffprobe")
        .args(["-hide_banner", "-decoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|_| PreviewError::ToolMissing("ffprobe".to_string()))?;
    if !output.status.success() {
        return Err(PreviewError::Subprocess {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let codecs = parse_cuda_decoders(&stdout);
    if codecs.is_empty() {
        return Err(PreviewError::NoHardwareDecoders);
    }
    Ok(codecs)
}

fn parse_cuda_decoders(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("Nvidia"))
        .filter_map(|line| CUDA_CODEC_PATTERN.captures(line))
        .map(|captures| captures[1].to_string())
        .collect()
}

#[derive(Debug, Deserialize, Default)]
struct ProbeFormat {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeData {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Probed properties of a video file.
#[derive(Debug, Clone)]
pub(crate) struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub codec: String,
}

/// Probe a file with ffprobe and pull out the first video stream.
pub(crate) async fn media_info(path: &Path) -> Result<MediaInfo, PreviewError> {
    let output = Command::new("ffprobe")
        .args([
            "-hide_banner",
            "-loglevel",
            "quiet",
            "-show_format",
            "-show_streams",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(PreviewError::Subprocess {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    parse_media_info(&String::from_utf8_lossy(&output.stdout))
}

fn parse_media_info(json: &str) -> Result<MediaInfo, PreviewError> {
    let data: ProbeData = serde_json::from_str(json)?;
    let duration: f64 = data
        .format
        .duration
        .parse()
        .map_err(|_| PreviewError::DurationParse)?;
    let stream = data
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or(PreviewError::NoVideoStream)?;

    Ok(MediaInfo {
        width: stream.width,
        height: stream.height,
        duration,
        codec: stream.codec_name.clone(),
    })
}

//! HLS playlist and chunk synthesis.
//!
//! No segmenter state is kept anywhere: the playlist is derived from a
//! video's duration alone, and every chunk is transcoded on demand from
//! the 10-second window its index describes.

use std::fmt::Write as _;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::catalog::entry::Entry;
use crate::error::HlsError;
use crate::timefmt;

/// Fixed chunk length in seconds.
pub const CHUNK_SECONDS: u64 = 10;

/// Synthesize the VOD playlist for a video entry.
pub fn playlist(entry: &Entry) -> String {
    let mut full_chunks = 0u64;
    let mut tail_seconds = entry.duration as u64;
    while tail_seconds >= CHUNK_SECONDS {
        tail_seconds -= CHUNK_SECONDS;
        full_chunks += 1;
    }

    let mut data = String::new();
    data.push_str("#EXTM3U\n");
    data.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
    data.push_str("#EXT-X-TARGETDURATION:10\n");
    data.push_str("#EXT-X-VERSION:4\n");
    data.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");

    for chunk in 0..full_chunks {
        data.push_str("#EXTINF:10.0,\n");
        let _ = writeln!(data, "{}/{}.ts", entry.id, chunk);
    }

    let _ = writeln!(data, "#EXTINF:{tail_seconds}.0,");
    let _ = writeln!(data, "{}/{}.ts", entry.id, full_chunks);
    data.push_str("#EXT-X-ENDLIST");

    data
}

/// Transcode the chunk named by `name` (`{index}.ts`) into an mpegts
/// buffer, bounded by `timeout`.
pub async fn chunk(
    cancel: &CancellationToken,
    entry: &Entry,
    name: &str,
    timeout: Duration,
) -> Result<Vec<u8>, HlsError> {
    let index: u64 = name
        .strip_suffix(".ts")
        .and_then(|stem| stem.parse().ok())
        .ok_or_else(|| HlsError::ParseChunkIndex(name.to_string()))?;

    let start = index * CHUNK_SECONDS;
    let end = (start + CHUNK_SECONDS).min(entry.duration as u64);

    let start_stamp = timefmt::timestamp(start);
    let end_stamp = timefmt::timestamp(end);

    let mut command = Command::new("ffmpeg");
    command
        .args([
            "-accurate_seek",
            "-ss",
            start_stamp.as_str(),
            "-to",
            end_stamp.as_str(),
            "-i",
        ])
        .arg(&entry.absolute_path)
        .args([
            "-preset",
            "ultrafast",
            "-crf",
            "30",
            "-map_metadata",
            "0",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof+faststart",
            "-copyts",
            "-copytb",
            "0",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-b:a",
            "160k",
            "-bsf:v",
            "h264_mp4toannexb",
            "-f",
            "mpegts",
            "-crf",
            "32",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(HlsError::Timeout),
        outcome = tokio::time::timeout(timeout, command.output()) => match outcome {
            Ok(output) => output?,
            Err(_) => return Err(HlsError::Timeout),
        },
    };

    if !output.status.success() {
        return Err(HlsError::Ffmpeg {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output.stdout)
}

//! Video collage rendering.
//!
//! A collage is five frames sampled across the video, tiled vertically
//! into one WebP. Two ffmpeg processes cooperate: a producer seeks every
//! timestamp with a fast pre-input `-ss` and writes raw frames to a pipe,
//! and a tiler reads the pipe and emits the final image.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::catalog::entry::Resolution;
use crate::error::PreviewError;
use crate::timefmt;

use super::probe;
use super::PreviewData;

const COLLAGE_ITEMS: usize = 5;
/// Earliest sample for videos longer than seven seconds; skips intros.
const MIN_START_SECONDS: f64 = 2.0;

/// Probe the file, sample timestamps and render the collage, all within
/// one deadline.
pub(crate) async fn render(
    cancel: &CancellationToken,
    path: &Path,
    cuda_codecs: &[String],
    timeout: Duration,
) -> Result<PreviewData, PreviewError> {
    let started = Instant::now();
    let info = bounded(cancel, timeout, probe::media_info(path)).await?;

    // Files the hardware decoders cannot handle take the software path.
    let use_cuda = cuda_codecs.iter().any(|codec| *codec == info.codec);
    let stamps = time_codes(info.duration);

    let remaining = timeout.saturating_sub(started.elapsed());
    let data = bounded(cancel, remaining, collage(path, &stamps, use_cuda)).await?;

    Ok(PreviewData {
        data,
        resolution: Resolution {
            width: info.width,
            height: info.height,
        },
        duration: info.duration,
    })
}

/// Sample timestamps: evenly spaced fifths with at least a one second
/// step. Stamps that would land past the end are dropped here and the
/// collage repeats the last valid frame instead.
pub(crate) fn time_codes(duration: f64) -> Vec<f64> {
    let step = (duration / COLLAGE_ITEMS as f64).max(1.0);
    let mut stamps = Vec::with_capacity(COLLAGE_ITEMS);

    for part in 0..COLLAGE_ITEMS {
        let mut stamp = step * part as f64;
        if stamp == 0.0 && duration > 7.0 {
            stamp = MIN_START_SECONDS;
        }
        if (stamp > duration && part > 1) || stamp == duration {
            continue;
        }
        stamps.push(stamp);
    }
    stamps
}

async fn collage(path: &Path, stamps: &[f64], use_cuda: bool) -> Result<Vec<u8>, PreviewError> {
    let mut args: Vec<String> = quiet_args();
    for (index, stamp) in stamps.iter().enumerate() {
        args.extend(input_args(path, *stamp, index, use_cuda));
    }
    // Pad to exactly five tiles by repeating the last frame.
    if let Some(last) = stamps.len().checked_sub(1) {
        for _ in stamps.len()..COLLAGE_ITEMS {
            args.extend(input_args(path, stamps[last], last, use_cuda));
        }
    }

    let mut producer = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let Some(frames) = producer.stdout.take() else {
        return Err(PreviewError::Subprocess {
            stderr: "producer stdout unavailable".to_string(),
        });
    };

    let mixer = Command::new("ffmpeg")
        .args(tile_args())
        .stdin(TryInto::<Stdio>::try_into(frames)?)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (producer_output, mixer_output) =
        tokio::join!(producer.wait_with_output(), mixer.wait_with_output());
    let producer_output = producer_output?;
    let mixer_output = mixer_output?;

    if !producer_output.status.success() {
        return Err(PreviewError::Subprocess {
            stderr: String::from_utf8_lossy(&producer_output.stderr).into_owned(),
        });
    }
    if !mixer_output.status.success() {
        return Err(PreviewError::Subprocess {
            stderr: String::from_utf8_lossy(&mixer_output.stderr).into_owned(),
        });
    }

    Ok(mixer_output.stdout)
}

fn quiet_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error"]
        .map(String::from)
        .to_vec()
}

fn input_args(path: &Path, stamp: f64, index: usize, use_cuda: bool) -> Vec<String> {
    if use_cuda {
        cuda_args(path, stamp, index)
    } else {
        software_args(path, stamp, index)
    }
}

fn software_args(path: &Path, stamp: f64, index: usize) -> Vec<String> {
    let mut args = vec![
        "-ss".to_string(),
        timefmt::timestamp(stamp as u64),
        "-i".to_string(),
        path.display().to_string(),
    ];
    args.extend(
        [
            "-vf", "scale=256:-2", "-frames:v", "1", "-c:v", "libx264", "-preset", "ultrafast",
            "-tune", "zerolatency", "-crf", "0", "-an", "-f", "rawvideo", "-map",
        ]
        .map(String::from),
    );
    args.push(format!("{index}:v:0"));
    args.push("pipe:1".to_string());
    args
}

fn cuda_args(path: &Path, stamp: f64, index: usize) -> Vec<String> {
    let mut args = ["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]
        .map(String::from)
        .to_vec();
    args.extend([
        "-ss".to_string(),
        timefmt::timestamp(stamp as u64),
        "-i".to_string(),
        path.display().to_string(),
    ]);
    args.extend(
        [
            "-vf",
            "scale_cuda=256:-1",
            "-frames:v",
            "1",
            "-c:v",
            "h264_nvenc",
            "-an",
            "-f",
            "rawvideo",
            "-map",
        ]
        .map(String::from),
    );
    args.push(format!("{index}:v:0"));
    args.push("pipe:1".to_string());
    args
}

fn tile_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        "pipe:0",
        "-c:v",
        "libwebp",
        "-vf",
        "tile=1x5",
        "-frames:v",
        "1",
        "-f",
        "image2",
        "-an",
        "pipe:1",
    ]
    .map(String::from)
    .to_vec()
}

/// Run a preview step under the deadline and the shutdown token.
async fn bounded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    work: F,
) -> Result<T, PreviewError>
where
    F: Future<Output = Result<T, PreviewError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(PreviewError::Cancelled),
        outcome = tokio::time::timeout(limit, work) => match outcome {
            Ok(result) => result,
            Err(_) => Err(PreviewError::Timeout),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_videos_sample_five_spaced_stamps() {
        let stamps = time_codes(100.0);
        assert_eq!(stamps, vec![2.0, 20.0, 40.0, 60.0, 80.0]);
    }

    #[test]
    fn first_stamp_stays_at_zero_for_short_videos() {
        let stamps = time_codes(6.0);
        assert_eq!(stamps[0], 0.0);
    }

    #[test]
    fn nudges_the_start_past_seven_seconds() {
        let stamps = time_codes(46.0);
        assert_eq!(stamps, vec![2.0, 9.2, 18.4, 27.6, 36.8]);
    }

    #[test]
    fn tiny_videos_drop_trailing_stamps() {
        let stamps = time_codes(3.0);
        assert_eq!(stamps, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn software_args_seek_before_input() {
        let args = software_args(Path::new("/v/clip.mp4"), 9.2, 3);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "00:09");
        assert!(args.contains(&"scale=256:-2".to_string()));
        assert!(args.contains(&"3:v:0".to_string()));
    }

    #[test]
    fn cuda_args_use_the_cuda_scaler() {
        let args = cuda_args(Path::new("/v/clip.mp4"), 2.0, 0);
        assert_eq!(args[0], "-hwaccel");
        assert_eq!(args[1], "cuda");
        assert!(args.contains(&"scale_cuda=256:-1".to_string()));
        assert!(args.contains(&"h264_nvenc".to_string()));
    }

    #[test]
    fn tiler_reads_the_pipe_and_writes_webp() {
        let args = tile_args();
        assert!(args.contains(&"pipe:0".to_string()));
        assert!(args.contains(&"tile=1x5".to_string()));
        assert!(args.contains(&"libwebp".to_string()));
    }
}

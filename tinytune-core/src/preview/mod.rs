//! Preview generation.
//!
//! A [`Previewer`] renders a small WebP artifact for every media file the
//! indexer hands it: a thumbnail for images, a five-frame collage for
//! videos and animated images. Tool availability and versions are probed
//! once at construction; per-file skip rules (exclusion set, size limit,
//! per-kind budgets) downgrade a file to an empty preview without failing
//! the build.

pub mod image;
mod probe;
mod throttle;
mod video;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::entry::{Entry, Resolution};
use crate::error::PreviewError;

/// Files at or above this size contend for a large-file slot.
const LARGE_FILE_BYTES: u64 = 500 * 1024 * 1024;
const LARGE_FILE_SLOTS: usize = 4;

/// Resolution handed to the player for videos that were never probed.
const VIDEO_FALLBACK_RESOLUTION: Resolution = Resolution {
    width: 1280,
    height: 720,
};

/// Hardware acceleration policy for video decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acceleration {
    /// Use CUDA when available, fall back to software silently.
    #[default]
    Auto,
    Software,
    /// Fail construction unless CUDA decoders are present.
    Hardware,
}

#[derive(Debug, Clone)]
pub struct PreviewerOptions {
    pub image_enabled: bool,
    pub video_enabled: bool,
    pub acceleration: Acceleration,
    /// Relative paths whose preview production is skipped.
    pub excluded: HashSet<String>,
    /// Remaining image previews to produce, -1 for unlimited.
    pub max_images: i64,
    /// Remaining video previews to produce, -1 for unlimited.
    pub max_videos: i64,
    /// Largest file to preview in bytes, -1 for unlimited.
    pub max_file_size: i64,
    /// Per-file deadline covering probe and collage.
    pub timeout: Duration,
}

impl Default for PreviewerOptions {
    fn default() -> Self {
        PreviewerOptions {
            image_enabled: true,
            video_enabled: true,
            acceleration: Acceleration::Auto,
            excluded: HashSet::new(),
            max_images: -1,
            max_videos: -1,
            max_file_size: -1,
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// A rendered preview: WebP bytes plus the original media dimensions and,
/// for videos, the duration in seconds.
#[derive(Debug, Clone, Default)]
pub struct PreviewData {
    pub data: Vec<u8>,
    pub resolution: Resolution,
    pub duration: f64,
}

/// What the previewer needs to know about a file.
pub trait PreviewSource: Send + Sync {
    fn is_image(&self) -> bool;
    fn is_video(&self) -> bool;
    fn is_animated_image(&self) -> bool;
    fn path(&self) -> &Path;
    fn relative_path(&self) -> &str;
    fn size(&self) -> u64;
}

impl PreviewSource for Entry {
    fn is_image(&self) -> bool {
        Entry::is_image(self)
    }

    fn is_video(&self) -> bool {
        Entry::is_video(self)
    }

    fn is_animated_image(&self) -> bool {
        Entry::is_animated_image(self)
    }

    fn path(&self) -> &Path {
        &self.absolute_path
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn size(&self) -> u64 {
        self.origin_size
    }
}

/// Seam between the index builder and preview production; lets tests
/// drive the builder without ffmpeg on the machine.
#[async_trait]
pub trait PreviewGenerator: Send + Sync {
    async fn pull(
        &self,
        cancel: &CancellationToken,
        source: &(dyn PreviewSource + '_),
    ) -> Result<PreviewData, PreviewError>;
}

#[derive(Debug)]
pub struct Previewer {
    options: PreviewerOptions,
    cuda_codecs: Vec<String>,
    images_left: AtomicI64,
    videos_left: AtomicI64,
    large_slots: Semaphore,
}

impl Previewer {
    /// Probe the external tools and assemble a previewer.
    ///
    /// With video processing enabled, ffmpeg and ffprobe must be on PATH
    /// at version 4.4.2 or newer. [`Acceleration::Hardware`] additionally
    /// requires at least one Nvidia decoder.
    pub async fn new(options: PreviewerOptions) -> Result<Self, PreviewError> {
        let mut cuda_codecs = Vec::new();
        if options.video_enabled {
            probe::require_tools().await?;
            match options.acceleration {
                Acceleration::Software => {}
                Acceleration::Hardware => {
                    cuda_codecs = probe::cuda_decoders().await?;
                    if cuda_codecs.is_empty() {
                        return Err(PreviewError::NoHardwareDecoders);
                    }
                }
                Acceleration::Auto => {
                    cuda_codecs = probe::cuda_decoders().await.unwrap_or_default();
                    if cuda_codecs.is_empty() {
                        info!("no hardware decoders found, using software processing");
                    }
                }
            }
        }

        Ok(Previewer {
            images_left: AtomicI64::new(options.max_images),
            videos_left: AtomicI64::new(options.max_videos),
            large_slots: Semaphore::new(LARGE_FILE_SLOTS),
            cuda_codecs,
            options,
        })
    }

    /// Produce the preview artifact for one file.
    ///
    /// Skip rules resolve to an empty preview without error; skipped
    /// videos still report the player fallback resolution.
    pub async fn pull(
        &self,
        cancel: &CancellationToken,
        source: &(dyn PreviewSource + '_),
    ) -> Result<PreviewData, PreviewError> {
        if self.options.excluded.contains(source.relative_path()) {
            return Ok(self.skipped(source));
        }
        if self.options.max_file_size >= 0 && source.size() > self.options.max_file_size as u64 {
            return Ok(self.skipped(source));
        }

        if source.is_image() {
            if !self.options.image_enabled || !budget_pass(&self.images_left) {
                return Ok(self.skipped(source));
            }
            if source.is_animated_image() && self.options.video_enabled {
                // Animations get a collage strip, but duration stays a
                // video-only field.
                let mut preview = self.video_preview(cancel, source).await?;
                preview.duration = 0.0;
                return Ok(preview);
            }
            return self.image_preview(source).await;
        }

        if source.is_video() {
            if !self.options.video_enabled || !budget_pass(&self.videos_left) {
                return Ok(self.skipped(source));
            }
            let preview = self.video_preview(cancel, source).await?;
            if preview.duration == 0.0 {
                return Ok(PreviewData::default());
            }
            return Ok(preview);
        }

        Ok(PreviewData::default())
    }

    async fn image_preview(
        &self,
        source: &(dyn PreviewSource + '_),
    ) -> Result<PreviewData, PreviewError> {
        let path = source.path().to_path_buf();
        let size = source.size();
        tokio::task::spawn_blocking(move || image::render_thumbnail(&path, size))
            .await
            .map_err(|_| PreviewError::Cancelled)?
    }

    async fn video_preview(
        &self,
        cancel: &CancellationToken,
        source: &(dyn PreviewSource + '_),
    ) -> Result<PreviewData, PreviewError> {
        let _slot = if source.size() >= LARGE_FILE_BYTES {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return Err(PreviewError::Cancelled),
                permit = self.large_slots.acquire() => {
                    permit.map_err(|_| PreviewError::Cancelled)?
                }
            };
            throttle::memory_gate(cancel).await?;
            Some(permit)
        } else {
            None
        };

        video::render(cancel, source.path(), &self.cuda_codecs, self.options.timeout).await
    }

    fn skipped(&self, source: &(dyn PreviewSource + '_)) -> PreviewData {
        if source.is_video() {
            return PreviewData {
                resolution: VIDEO_FALLBACK_RESOLUTION,
                ..PreviewData::default()
            };
        }
        PreviewData::default()
    }
}

#[async_trait]
impl PreviewGenerator for Previewer {
    async fn pull(
        &self,
        cancel: &CancellationToken,
        source: &(dyn PreviewSource + '_),
    ) -> Result<PreviewData, PreviewError> {
        Previewer::pull(self, cancel, source).await
    }
}

/// Take one unit from an atomic budget; -1 means unlimited.
fn budget_pass(budget: &AtomicI64) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            -1 => Some(-1),
            0 => None,
            n => Some(n - 1),
        })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Source {
        path: PathBuf,
        relative_path: String,
        size: u64,
        video: bool,
        animated: bool,
    }

    impl Source {
        fn image(relative_path: &str, path: PathBuf, size: u64) -> Self {
            Source {
                path,
                relative_path: relative_path.to_string(),
                size,
                video: false,
                animated: false,
            }
        }

        fn video(relative_path: &str, size: u64) -> Self {
            Source {
                path: PathBuf::from(relative_path),
                relative_path: relative_path.to_string(),
                size,
                video: true,
                animated: false,
            }
        }
    }

    impl PreviewSource for Source {
        fn is_image(&self) -> bool {
            !self.video
        }

        fn is_video(&self) -> bool {
            self.video
        }

        fn is_animated_image(&self) -> bool {
            self.animated
        }

        fn path(&self) -> &Path {
            &self.path
        }

        fn relative_path(&self) -> &str {
            &self.relative_path
        }

        fn size(&self) -> u64 {
            self.size
        }
    }

    async fn previewer(options: PreviewerOptions) -> Previewer {
        // Video processing stays off so construction never probes ffmpeg.
        Previewer::new(PreviewerOptions {
            video_enabled: false,
            ..options
        })
        .await
        .unwrap()
    }

    fn sample_png(dir: &Path) -> PathBuf {
        let path = dir.join("sample.png");
        ::image::RgbaImage::from_pixel(320, 200, ::image::Rgba([10, 200, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn budget_counts_down_and_stops() {
        let budget = AtomicI64::new(2);
        assert!(budget_pass(&budget));
        assert!(budget_pass(&budget));
        assert!(!budget_pass(&budget));
        assert!(!budget_pass(&budget));
    }

    #[test]
    fn negative_budget_is_unlimited() {
        let budget = AtomicI64::new(-1);
        for _ in 0..100 {
            assert!(budget_pass(&budget));
        }
        assert_eq!(budget.load(Ordering::SeqCst), -1);
    }

    #[tokio::test]
    async fn renders_image_previews() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample_png(dir.path());
        let p = previewer(PreviewerOptions::default()).await;

        let preview = p
            .pull(
                &CancellationToken::new(),
                &Source::image("sample.png", png, 100),
            )
            .await
            .unwrap();
        assert!(!preview.data.is_empty());
        assert_eq!(preview.resolution.width, 320);
        assert_eq!(preview.resolution.height, 200);
        assert_eq!(preview.duration, 0.0);
    }

    #[tokio::test]
    async fn excluded_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample_png(dir.path());
        let p = previewer(PreviewerOptions {
            excluded: HashSet::from(["skip/me.png".to_string()]),
            ..PreviewerOptions::default()
        })
        .await;

        let preview = p
            .pull(
                &CancellationToken::new(),
                &Source::image("skip/me.png", png, 100),
            )
            .await
            .unwrap();
        assert!(preview.data.is_empty());
    }

    #[tokio::test]
    async fn image_budget_limits_previews() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample_png(dir.path());
        let p = previewer(PreviewerOptions {
            max_images: 1,
            ..PreviewerOptions::default()
        })
        .await;
        let cancel = CancellationToken::new();

        let first = p
            .pull(&cancel, &Source::image("a.png", png.clone(), 100))
            .await
            .unwrap();
        let second = p
            .pull(&cancel, &Source::image("b.png", png, 100))
            .await
            .unwrap();
        assert!(!first.data.is_empty());
        assert!(second.data.is_empty());
    }

    #[tokio::test]
    async fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let png = sample_png(dir.path());
        let p = previewer(PreviewerOptions {
            max_file_size: 10,
            ..PreviewerOptions::default()
        })
        .await;

        let preview = p
            .pull(
                &CancellationToken::new(),
                &Source::image("big.png", png, 11),
            )
            .await
            .unwrap();
        assert!(preview.data.is_empty());
    }

    #[tokio::test]
    async fn skipped_videos_get_the_player_fallback_resolution() {
        let p = previewer(PreviewerOptions::default()).await;
        let preview = p
            .pull(&CancellationToken::new(), &Source::video("clip.mp4", 100))
            .await
            .unwrap();
        assert!(preview.data.is_empty());
        assert_eq!(preview.resolution, VIDEO_FALLBACK_RESOLUTION);
        assert_eq!(preview.duration, 0.0);
    }
}

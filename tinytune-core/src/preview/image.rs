//! Image thumbnail rendering.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::jpeg::JpegDecoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageDecoder};

use crate::catalog::entry::Resolution;
use crate::error::PreviewError;

use super::PreviewData;

/// Longest thumbnail edge in pixels.
const MAX_EDGE: u32 = 256;
/// JPEGs above this size decode at reduced scale to cap peak memory.
const JPEG_SHRINK_THRESHOLD: u64 = 512 * 1024;
const JPEG_SHRINK_FACTOR: u32 = 8;

/// Decode an image, record its original dimensions and encode a WebP
/// thumbnail of at most [`MAX_EDGE`] pixels on the longer side.
pub(crate) fn render_thumbnail(path: &Path, origin_size: u64) -> Result<PreviewData, PreviewError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let (image, resolution) = if (extension == "jpg" || extension == "jpeg")
        && origin_size > JPEG_SHRINK_THRESHOLD
    {
        shrink_on_load(path)?
    } else {
        let image = image::open(path)?;
        let (width, height) = image.dimensions();
        (image, Resolution { width, height })
    };

    let thumbnail = image.thumbnail(MAX_EDGE, MAX_EDGE);
    let (width, height) = thumbnail.dimensions();
    let pixels = thumbnail.to_rgba8();

    let mut data = Vec::new();
    WebPEncoder::new_lossless(&mut data).encode(pixels.as_raw(), width, height, ColorType::Rgba8)?;

    Ok(PreviewData {
        data,
        resolution,
        duration: 0.0,
    })
}

fn shrink_on_load(path: &Path) -> Result<(DynamicImage, Resolution), PreviewError> {
    let reader = BufReader::new(File::open(path)?);
    let mut decoder = JpegDecoder::new(reader)?;
    let (width, height) = decoder.dimensions();
    decoder.scale(
        (width / JPEG_SHRINK_FACTOR).max(1) as u16,
        (height / JPEG_SHRINK_FACTOR).max(1) as u16,
    )?;
    let image = DynamicImage::from_decoder(decoder)?;
    Ok((image, Resolution { width, height }))
}

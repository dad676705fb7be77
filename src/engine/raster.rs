//! Default transcoding capability built on the `image` crate.
//!
//! A best-effort size search: fit the image inside the dimension bound, then lower JPEG
//! quality, then shrink dimensions until the encoding fits the byte budget. If nothing fits
//! the smallest encoding seen is returned.

use super::{ProgressReporter, TranscodeOptions, Transcoder};
use crate::model::{ImageArtifact, ImageMime};
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

const JPEG_QUALITIES: [u8; 6] = [90, 80, 70, 60, 50, 40];
const SHRINK_FACTOR: f32 = 0.85;
const MAX_ITERATIONS: usize = 10;
const MIN_DIMENSION_PX: u32 = 16;

/// Re-encodes in the input's own format. `image` only writes lossless WebP, so WebP inputs
/// usually reach the target through downscaling alone and results there are best-effort.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterTranscoder;

impl RasterTranscoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transcoder for RasterTranscoder {
    async fn transcode(
        &self,
        input: Arc<ImageArtifact>,
        options: TranscodeOptions,
        progress: ProgressReporter,
    ) -> Result<ImageArtifact> {
        tokio::task::spawn_blocking(move || shrink(&input, options, &progress))
            .await
            .context("transcode task failed")?
    }
}

fn image_format(mime: ImageMime) -> ImageFormat {
    match mime {
        ImageMime::Jpeg => ImageFormat::Jpeg,
        ImageMime::Png => ImageFormat::Png,
        ImageMime::WebP => ImageFormat::WebP,
    }
}

fn encode(img: &DynamicImage, mime: ImageMime, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match mime {
        ImageMime::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
                .encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ColorType::Rgb8.into(),
                )
                .context("jpeg encoding failed")?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut out), image_format(other))
                .with_context(|| format!("{other} encoding failed"))?;
        }
    }
    Ok(out)
}

fn fit_within(img: DynamicImage, max_dimension_px: u32) -> DynamicImage {
    if img.width() <= max_dimension_px && img.height() <= max_dimension_px {
        return img;
    }
    img.resize(max_dimension_px, max_dimension_px, FilterType::Triangle)
}

/// Synchronous search. Progress runs 5 (decoded) → 20 (resized) → 95 over iterations.
pub(crate) fn shrink(
    input: &ImageArtifact,
    options: TranscodeOptions,
    progress: &ProgressReporter,
) -> Result<ImageArtifact> {
    let mime = input.mime();
    let decoded = image::load_from_memory_with_format(input.bytes(), image_format(mime))
        .with_context(|| format!("failed to decode {}", input.original_file_name()))?;
    progress.report(5);

    let within_bound = decoded.width() <= options.max_dimension_px
        && decoded.height() <= options.max_dimension_px;
    if within_bound && input.size_bytes() <= options.max_size_bytes {
        debug!(
            size_bytes = input.size_bytes(),
            "input already under target, returning as-is"
        );
        return Ok(input.clone());
    }

    let mut img = fit_within(decoded, options.max_dimension_px.max(MIN_DIMENSION_PX));
    progress.report(20);

    let qualities: &[u8] = match mime {
        ImageMime::Jpeg => &JPEG_QUALITIES,
        _ => &[100],
    };

    let mut best: Option<Vec<u8>> = None;
    for iteration in 0..MAX_ITERATIONS {
        for &quality in qualities {
            let encoded = encode(&img, mime, quality)?;
            debug!(
                iteration,
                quality,
                width = img.width(),
                height = img.height(),
                size_bytes = encoded.len(),
                "encoded candidate"
            );
            let fits = encoded.len() as u64 <= options.max_size_bytes;
            if best.as_ref().map_or(true, |b| encoded.len() < b.len()) {
                best = Some(encoded);
            }
            if fits {
                return Ok(finish(input, best, within_bound, progress));
            }
        }
        progress.report(20 + ((iteration + 1) * 75 / MAX_ITERATIONS) as u8);

        let w = ((img.width() as f32) * SHRINK_FACTOR) as u32;
        let h = ((img.height() as f32) * SHRINK_FACTOR) as u32;
        if w < MIN_DIMENSION_PX || h < MIN_DIMENSION_PX {
            break;
        }
        img = img.resize_exact(w, h, FilterType::Triangle);
    }

    Ok(finish(input, best, within_bound, progress))
}

/// An input outside the dimension bound is never returned as-is, even when the resized
/// encoding is larger.
fn finish(
    input: &ImageArtifact,
    best: Option<Vec<u8>>,
    within_bound: bool,
    progress: &ProgressReporter,
) -> ImageArtifact {
    progress.report(95);
    match best {
        Some(bytes) if !within_bound || (bytes.len() as u64) < input.size_bytes() => {
            ImageArtifact::new(bytes, input.mime(), input.original_file_name())
        }
        // Re-encoding did not help; the original is the smallest we have.
        _ => input.clone(),
    }
}

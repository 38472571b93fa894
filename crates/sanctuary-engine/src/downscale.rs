use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

pub const JPEG_MIME: &str = "image/jpeg";
/// 4.5 MiB of decoded payload.
pub const DEFAULT_MAX_BYTES: usize = 4_718_592;
pub const DEFAULT_ATTEMPTS: [DownscaleAttempt; 3] = [
    DownscaleAttempt::new(1024, 75),
    DownscaleAttempt::new(768, 60),
    DownscaleAttempt::new(512, 50),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownscaleAttempt {
    pub max_dim: u32,
    pub quality: u8,
}

impl DownscaleAttempt {
    pub const fn new(max_dim: u32, quality: u8) -> Self {
        Self { max_dim, quality }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub attempt: DownscaleAttempt,
    pub width: u32,
    pub height: u32,
    pub estimated_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Downscaled {
    pub jpeg: Vec<u8>,
    pub base64: String,
    pub width: u32,
    pub height: u32,
    /// False when even the last attempt overshot the budget.
    pub within_budget: bool,
    pub attempts: Vec<AttemptReport>,
}

impl Downscaled {
    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    pub fn data_url(&self) -> String {
        format!("data:{JPEG_MIME};base64,{}", self.base64)
    }

    /// Stable id for ledger entries created from this image.
    pub fn scan_id(&self) -> String {
        hex::encode(Sha256::digest(&self.jpeg))
    }
}

/// Decoded size implied by a base64 body.
pub fn estimated_decoded_bytes(encoded: &str) -> usize {
    encoded.len() * 3 / 4
}

pub fn downscale_file(
    path: &Path,
    attempts: &[DownscaleAttempt],
    max_bytes: usize,
) -> Result<Downscaled> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    downscale(&image, attempts, max_bytes)
}

/// Re-encodes `image` as JPEG, stepping down through `attempts` until the
/// encoded payload fits `max_bytes`. The last attempt is accepted regardless.
pub fn downscale(
    image: &DynamicImage,
    attempts: &[DownscaleAttempt],
    max_bytes: usize,
) -> Result<Downscaled> {
    if attempts.is_empty() {
        bail!("no downscale attempts configured");
    }
    let flattened = flatten_on_white(image);
    let mut reports = Vec::with_capacity(attempts.len());
    let mut last = None;

    for attempt in attempts {
        let resized = fit_within(&flattened, attempt.max_dim);
        let (width, height) = resized.dimensions();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, attempt.quality.clamp(1, 100))
            .encode_image(&resized)
            .with_context(|| format!("jpeg encode failed at {}px", attempt.max_dim))?;
        let base64 = BASE64.encode(&jpeg);
        let estimated_bytes = estimated_decoded_bytes(&base64);
        tracing::debug!(
            max_dim = attempt.max_dim,
            quality = attempt.quality,
            estimated_bytes,
            "downscale attempt"
        );
        reports.push(AttemptReport {
            attempt: *attempt,
            width,
            height,
            estimated_bytes,
        });
        let within_budget = estimated_bytes <= max_bytes;
        last = Some(Downscaled {
            jpeg,
            base64,
            width,
            height,
            within_budget,
            attempts: Vec::new(),
        });
        if within_budget {
            break;
        }
    }

    let Some(mut chosen) = last else {
        bail!("downscale produced no output");
    };
    if !chosen.within_budget {
        tracing::warn!(max_bytes, "image still over budget after final downscale attempt");
    }
    chosen.attempts = reports;
    Ok(chosen)
}

fn flatten_on_white(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(flattened).to_rgb8())
}

// Never upscales.
fn fit_within(image: &DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_dim {
        return image.clone();
    }
    image.resize(max_dim, max_dim, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn noisy(width: u32, height: u32) -> DynamicImage {
        let mut image = RgbImage::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let seed = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
            *pixel = Rgb([(seed & 0xff) as u8, ((seed >> 8) & 0xff) as u8, ((seed >> 16) & 0xff) as u8]);
        }
        DynamicImage::ImageRgb8(image)
    }

    #[test]
    fn first_attempt_wins_when_it_fits() -> anyhow::Result<()> {
        let out = downscale(&noisy(2048, 1024), &DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES)?;
        assert_eq!((out.width, out.height), (1024, 512));
        assert_eq!(out.attempts.len(), 1);
        assert!(out.within_budget);
        assert_eq!(out.mime_type(), "image/jpeg");
        assert!(out.data_url().starts_with("data:image/jpeg;base64,"));
        Ok(())
    }

    #[test]
    fn small_images_are_not_upscaled() -> anyhow::Result<()> {
        let out = downscale(&noisy(300, 200), &DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES)?;
        assert_eq!((out.width, out.height), (300, 200));
        Ok(())
    }

    #[test]
    fn over_budget_walks_every_attempt_and_keeps_the_last() -> anyhow::Result<()> {
        let out = downscale(&noisy(1600, 1600), &DEFAULT_ATTEMPTS, 16)?;
        assert_eq!(out.attempts.len(), 3);
        assert_eq!((out.width, out.height), (512, 512));
        assert!(!out.within_budget);
        let sizes: Vec<usize> = out.attempts.iter().map(|report| report.estimated_bytes).collect();
        assert!(sizes[0] > sizes[2]);
        assert_eq!(out.attempts[2].attempt, DownscaleAttempt::new(512, 50));
        Ok(())
    }

    #[test]
    fn transparency_is_flattened_on_white() -> anyhow::Result<()> {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0])));
        let out = downscale(&clear, &DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES)?;
        let decoded = image::load_from_memory(&out.jpeg)?.to_rgb8();
        let centre = decoded.get_pixel(32, 32);
        assert!(centre.0.iter().all(|channel| *channel > 245), "{centre:?}");
        Ok(())
    }

    #[test]
    fn scan_id_is_stable_hex() -> anyhow::Result<()> {
        let image = noisy(64, 64);
        let first = downscale(&image, &DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES)?;
        let second = downscale(&image, &DEFAULT_ATTEMPTS, DEFAULT_MAX_BYTES)?;
        assert_eq!(first.scan_id(), second.scan_id());
        assert_eq!(first.scan_id().len(), 64);
        Ok(())
    }

    #[test]
    fn empty_attempt_list_is_an_error() {
        assert!(downscale(&noisy(8, 8), &[], DEFAULT_MAX_BYTES).is_err());
        assert_eq!(estimated_decoded_bytes("AAAA"), 3);
    }
}

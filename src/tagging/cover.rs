//! Cover art normalization before embedding
//!
//! Catalog covers come in whatever format and size the CDN serves. Before
//! they go into an APIC frame they are bounded to `max_edge` pixels and
//! re-encoded as baseline JPEG, dropping quality in steps until the result
//! fits in [`MAX_COVER_BYTES`].

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

/// JPEG qualities tried in order
const QUALITY_STEPS: [u8; 5] = [90, 80, 70, 60, 50];

/// Largest cover we embed (1MB)
pub const MAX_COVER_BYTES: usize = 1024 * 1024;

/// Decode `data`, fit it within `max_edge` and re-encode as JPEG
pub fn process_cover_art(data: &[u8], max_edge: u32) -> Result<Vec<u8>> {
    let decoded = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Unrecognised cover image")?
        .decode()
        .context("Cover image could not be decoded")?;
    let image = fit_within(decoded, max_edge);

    let mut encoded = Vec::new();
    for quality in QUALITY_STEPS {
        encoded = encode_jpeg(&image, quality)?;
        if encoded.len() <= MAX_COVER_BYTES {
            debug!(
                "Cover normalized to {}x{}, {} bytes at quality {}",
                image.width(),
                image.height(),
                encoded.len(),
                quality
            );
            return Ok(encoded);
        }
    }

    warn!(
        "Cover still {} bytes at lowest quality, embedding anyway",
        encoded.len()
    );
    Ok(encoded)
}

/// Like [`process_cover_art`], but hands back the original bytes on failure
pub fn normalize_cover_art(data: &[u8], max_edge: u32) -> Vec<u8> {
    process_cover_art(data, max_edge).unwrap_or_else(|e| {
        warn!("Embedding cover art as-is: {:#}", e);
        data.to_vec()
    })
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&image.to_rgb8())
        .context("JPEG encoding failed")?;
    Ok(out)
}

/// Shrink so neither side exceeds `max_edge`, keeping the aspect ratio
fn fit_within(image: DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_edge {
        return image;
    }
    // `resize` keeps the aspect ratio inside the given bounds
    image.resize(max_edge, max_edge, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_small_cover_keeps_dimensions() {
        let fitted = fit_within(DynamicImage::new_rgb8(120, 80), 300);
        assert_eq!((fitted.width(), fitted.height()), (120, 80));
    }

    #[test]
    fn test_wide_cover_bounded_by_width() {
        let fitted = fit_within(DynamicImage::new_rgb8(1500, 1000), 300);
        assert_eq!(fitted.width(), 300);
        assert_eq!(fitted.height(), 200);
    }

    #[test]
    fn test_png_becomes_jpeg() {
        let jpeg = process_cover_art(&png(40, 20), 1000).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8, 0xFF]));
        assert!(jpeg.len() <= MAX_COVER_BYTES);
    }

    #[test]
    fn test_undecodable_cover_passed_through() {
        let garbage = b"definitely not an image".to_vec();
        assert_eq!(normalize_cover_art(&garbage, 1000), garbage);
    }
}

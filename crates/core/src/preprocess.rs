//! Image preprocessing for vision model transmission.
//!
//! Backends accept base64-embedded images, so oversized originals waste
//! tokens and upload time. Images whose longest side exceeds the configured
//! ceiling are downscaled with a Lanczos filter; transparency is flattened
//! onto white when the target format lacks alpha. Any processing failure
//! falls back to the untouched original bytes.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::config::{OutputFormat, PreprocessConfig};

/// Downsize and re-encode image bytes for transmission.
///
/// Never fails: on any decode or encode error the original bytes are
/// returned unchanged so the backend still gets *something* to look at.
pub fn preprocess_image(bytes: Vec<u8>, cfg: &PreprocessConfig) -> Vec<u8> {
    match encode_for_vision(&bytes, cfg) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, "Image preprocessing failed, sending original bytes");
            bytes
        }
    }
}

/// Fallible core of [`preprocess_image`], separated for testing.
pub fn encode_for_vision(
    bytes: &[u8],
    cfg: &PreprocessConfig,
) -> Result<Vec<u8>, image::ImageError> {
    let mut img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());

    if width.max(height) > cfg.max_resolution {
        let (new_width, new_height) =
            target_dimensions(width, height, cfg.max_resolution, cfg.maintain_aspect_ratio);
        tracing::debug!(
            from = format!("{width}x{height}"),
            to = format!("{new_width}x{new_height}"),
            "Downscaling image for vision backend",
        );
        img = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
    }

    let mut buf = Vec::new();
    match cfg.format {
        OutputFormat::Jpeg => {
            let rgb = flatten_onto_white(&img);
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, cfg.quality))?;
        }
        OutputFormat::Webp => {
            // The pure-Rust webp encoder is lossless-only; quality is ignored.
            if img.color().has_alpha() {
                img.to_rgba8()
                    .write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
            } else {
                img.to_rgb8()
                    .write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
            }
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
    }
    Ok(buf)
}

/// Compute downscale dimensions for an image exceeding `max_size` on its
/// longest side. Preserves aspect ratio unless forced square.
fn target_dimensions(
    width: u32,
    height: u32,
    max_size: u32,
    maintain_aspect_ratio: bool,
) -> (u32, u32) {
    if !maintain_aspect_ratio {
        return (max_size, max_size);
    }
    if width >= height {
        let scaled = (height as f64 * (max_size as f64 / width as f64)) as u32;
        (max_size, scaled.max(1))
    } else {
        let scaled = (width as f64 * (max_size as f64 / height as f64)) as u32;
        (scaled.max(1), max_size)
    }
}

/// Composite any alpha channel onto a white background and return RGB.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blended = out.get_pixel_mut(x, y);
        for channel in 0..3 {
            blended[channel] =
                ((pixel[channel] as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        }
    }
    out
}

use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use thiserror::Error;

/// Rejection of an upload whose bytes do not survive image validation.
/// Never retried; surfaces to the HTTP caller as a 400.
#[derive(Debug, Error)]
#[error("invalid image: {reason}")]
pub struct InvalidImage {
    pub reason: String,
}

impl InvalidImage {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Validates uploaded bytes as an image and normalizes them for storage.
///
/// The bitstream must sniff as an image and fully decode. JPEGs are
/// normalized to RGB and re-encoded at a fixed quality, PNGs are re-encoded
/// only when a resize was needed, and GIFs pass through unchanged so
/// animation frames survive. Images larger than `max_dimension` on their
/// longest side are scaled down proportionally. Whenever the bytes were
/// transformed, the result is decoded once more; a bitstream can parse and
/// still fail this deeper check after transformation.
///
/// CPU-bound; callers on the async path should wrap this in
/// `tokio::task::spawn_blocking`.
pub fn validate_and_normalize(
    bytes: &[u8],
    ext: &str,
    max_dimension: u32,
    jpeg_quality: u8,
) -> Result<Vec<u8>, InvalidImage> {
    if !infer::is_image(bytes) {
        return Err(InvalidImage::new("content is not a recognized image type"));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| InvalidImage::new(format!("decode failed: {e}")))?;

    let oversized = img.width().max(img.height()) > max_dimension;

    let normalized = match ext {
        "jpg" | "jpeg" => {
            let img = if oversized {
                img.thumbnail(max_dimension, max_dimension)
            } else {
                img
            };
            // JPEG cannot carry an alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            Some(encode(&rgb, ImageOutputFormat::Jpeg(jpeg_quality))?)
        }
        "png" if oversized => {
            let img = img.thumbnail(max_dimension, max_dimension);
            Some(encode(&img, ImageOutputFormat::Png)?)
        }
        _ => None,
    };

    match normalized {
        Some(out) => {
            image::load_from_memory(&out)
                .map_err(|e| InvalidImage::new(format!("post-normalization check failed: {e}")))?;
            Ok(out)
        }
        None => Ok(bytes.to_vec()),
    }
}

fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, InvalidImage> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format)
        .map_err(|e| InvalidImage::new(format!("re-encode failed: {e}")))?;
    Ok(out.into_inner())
}

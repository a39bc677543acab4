//! Image helpers shared by the search engines: thumbnail decoding,
//! resizing and histogram-correlation similarity.

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat};
use scry_core::BackendError;

/// Longest side of the thumbnail uploaded to engines that want a small image.
pub const THUMBNAIL_SIZE: u32 = 256;

const BINS: usize = 256;

/// Decodes a `data:image/...;base64,` URI.
///
/// Missing base64 padding is tolerated.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] if the URI has no payload or the
/// payload is not base64.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, BackendError> {
    let Some((_, payload)) = uri.split_once(',') else {
        return Err(BackendError::InvalidInput("data URI without payload".into()));
    };
    let payload = payload.trim().trim_end_matches('=');
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(payload)
        .map_err(|e| BackendError::InvalidInput(format!("invalid base64 thumbnail: {e}")))
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes)
        .map_err(|e| BackendError::InvalidInput(format!("undecodable image: {e}")))
}

fn histogram(image: &GrayImage) -> [f64; BINS] {
    let mut hist = [0.0; BINS];
    for pixel in image.pixels() {
        hist[usize::from(pixel.0[0])] += 1.0;
    }

    let (min, max) = hist
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if range > 0.0 {
        for v in &mut hist {
            *v = (*v - min) / range;
        }
    } else {
        hist = [0.0; BINS];
    }
    hist
}

fn correlation(a: &[f64; BINS], b: &[f64; BINS]) -> f64 {
    let n = BINS as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 {
        cov / denom
    } else if var_a == var_b {
        1.0
    } else {
        0.0
    }
}

/// Histogram-correlation similarity of two encoded images, in `[-1, 1]`.
///
/// Both images are converted to grayscale; the one with more pixels is
/// resized to the other's dimensions first. Either input being empty
/// yields `0.0`.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] if either image cannot be decoded.
pub fn image_similarity(image: &[u8], base: &[u8]) -> Result<f64, BackendError> {
    if image.is_empty() || base.is_empty() {
        return Ok(0.0);
    }
    let mut a = decode(image)?;
    let mut b = decode(base)?;

    let area = |i: &DynamicImage| u64::from(i.width()) * u64::from(i.height());
    if area(&a) > area(&b) {
        a = a.resize_exact(b.width(), b.height(), FilterType::Triangle);
    } else {
        b = b.resize_exact(a.width(), a.height(), FilterType::Triangle);
    }

    Ok(correlation(&histogram(&a.to_luma8()), &histogram(&b.to_luma8())))
}

/// Target dimensions whose shorter side is `target`, preserving aspect ratio.
pub fn scaled_size(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scale = |d1: u32, d2: u32| ((f64::from(target) / f64::from(d1)) * f64::from(d2)).round() as u32;
    if width > height {
        (scale(height, width), target)
    } else {
        (target, scale(width, height))
    }
}

/// Encodes a PNG no larger than [`THUMBNAIL_SIZE`] on either side.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] if the image cannot be decoded or
/// re-encoded.
pub fn png_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, BackendError> {
    let image = decode(bytes)?;
    let (w, h) = scaled_size(image.width().max(1), image.height().max(1), THUMBNAIL_SIZE);
    let thumb = image.thumbnail(w.min(THUMBNAIL_SIZE), h.min(THUMBNAIL_SIZE));

    let mut out = std::io::Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| BackendError::InvalidInput(format!("thumbnail encoding failed: {e}")))?;
    Ok(out.into_inner())
}

//! Concrete search engine backends.
//!
//! Every engine uploads the query image, parses the engine's reply into
//! [`Candidate`](super::collect::Candidate)s and hands them to
//! [`collect`](super::collect::collect), capped at the engine's
//! candidate limit.

pub mod fluffle;
pub mod iqdb;
pub mod saucenao;
pub mod tracemoe;

use bytes::Bytes;
use image::ImageFormat;
use scry_core::BackendError;

/// MIME type and file name for an upload, guessed from the image header.
pub(crate) fn upload_meta(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => ("image/png", "image.png"),
        Ok(ImageFormat::Gif) => ("image/gif", "image.gif"),
        Ok(ImageFormat::WebP) => ("image/webp", "image.webp"),
        _ => ("image/jpeg", "image.jpg"),
    }
}

/// Multipart file part carrying the query image.
///
/// # Errors
///
/// Returns [`BackendError::InvalidInput`] if the MIME type is rejected.
pub(crate) fn image_part(bytes: &Bytes) -> Result<reqwest::multipart::Part, BackendError> {
    let (mime, name) = upload_meta(bytes);
    reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name(name)
        .mime_str(mime)
        .map_err(|e| BackendError::InvalidInput(format!("invalid upload type: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_png_and_falls_back_to_jpeg() {
        assert_eq!(upload_meta(b"\x89PNG\r\n\x1a\n0000").0, "image/png");
        assert_eq!(upload_meta(b"GIF89a0000").0, "image/gif");
        assert_eq!(upload_meta(b"unknown").0, "image/jpeg");
    }
}

//! Conversions between in-memory bitmaps and transportable byte buffers.
//!
//! Images are owned by whichever pipeline stage currently holds them and are
//! never mutated in place; crossing a service boundary always goes through a
//! fresh encode here.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

/// Errors from local image encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bitmap could not be serialized to PNG.
    #[error("EncodeError: {0}")]
    Encode(#[source] image::ImageError),

    /// The byte buffer did not contain a decodable image.
    #[error("DecodeError: {0}")]
    Decode(#[source] image::ImageError),
}

/// Encode a bitmap as PNG bytes for upload.
///
/// Inputs that are not already 8-bit RGB(A) are converted first so every
/// service boundary sees a uniform pixel format.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if PNG serialization fails.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Cursor::new(Vec::new());
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(CodecError::Encode)?,
        other => DynamicImage::ImageRgba8(other.to_rgba8())
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(CodecError::Encode)?,
    }
    Ok(buffer.into_inner())
}

/// Decode downloaded bytes into a bitmap, sniffing the container format.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a supported image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(bytes).map_err(CodecError::Decode)
}

/// Encode a bitmap as a `data:` URL, the inline form the prediction services
/// accept for image uploads.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if PNG serialization fails.
pub fn to_data_url(image: &DynamicImage) -> Result<String, CodecError> {
    let png = encode_png(image)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
}

//! Text payload codec.
//!
//! Payloads are base64 text, optionally carrying a scheme prefix up to the
//! first comma (`data:image/png;base64,....`). The prefix is discarded,
//! ASCII whitespace is ignored, and the remaining bytes are decoded with the
//! `image` crate.

use crate::image::RasterImage;
use crate::util::{DecodeError, IconMatchError, IconMatchResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Returns the encoded part of a payload, dropping any `<scheme-info>,` prefix.
pub fn strip_scheme(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    }
}

/// Decodes a text payload into a raster image.
pub fn decode(payload: &str) -> Result<RasterImage, DecodeError> {
    let encoded: String = strip_scheme(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if encoded.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let bytes = STANDARD.decode(encoded.as_bytes())?;
    decode_bytes(&bytes)
}

/// Decodes raw encoded image bytes (PNG, JPEG, ...) into a raster image.
pub fn decode_bytes(bytes: &[u8]) -> Result<RasterImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let img = image::load_from_memory(bytes).map_err(|err| DecodeError::Image {
        reason: err.to_string(),
    })?;
    RasterImage::from_dynamic(img)
}

/// Encodes a raster as PNG bytes.
pub fn encode_png(img: &RasterImage) -> IconMatchResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.as_rgb().clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|err| IconMatchError::Encode {
            reason: err.to_string(),
        })?;
    Ok(buf)
}

/// Encodes a raster as a bare base64 PNG payload.
pub fn encode_png_base64(img: &RasterImage) -> IconMatchResult<String> {
    Ok(STANDARD.encode(encode_png(img)?))
}

/// Encodes a raster as a `data:image/png;base64,` URI.
pub fn encode_data_uri(img: &RasterImage) -> IconMatchResult<String> {
    Ok(format!("data:image/png;base64,{}", encode_png_base64(img)?))
}

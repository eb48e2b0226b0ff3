//! Transport encodings for frames and spreadsheet bytes.
//!
//! Frames travel as PNG, and every binary payload is wrapped in standard
//! base64 for the JSON request body.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;

use crate::camera::{frame_to_image, Frame};

/// Errors from encoding or decoding transport payloads.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("frame buffer does not match its {width}x{height} dimensions")]
    InvalidFrame { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode a frame as PNG bytes.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, EncodeError> {
    let image = frame_to_image(frame).ok_or(EncodeError::InvalidFrame {
        width: frame.width,
        height: frame.height,
    })?;

    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64, tolerating a `data:<mime>;base64,` prefix and
/// surrounding whitespace.
pub fn from_base64(payload: &str) -> Result<Vec<u8>, EncodeError> {
    let trimmed = payload.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, b)| b).unwrap_or(rest),
        None => trimmed,
    };
    Ok(STANDARD.decode(body)?)
}

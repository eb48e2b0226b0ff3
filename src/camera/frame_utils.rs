//! Frame conversion helpers and ffmpeg failure classification.

use image::{DynamicImage, RgbImage};

use super::types::{CameraError, Frame};

/// Keywords in ffmpeg output that indicate the OS refused camera access.
const PERMISSION_KEYWORDS: &[&str] = &["permission", "denied", "not authorized", "authorization"];

/// Convert a decoded image of any pixel format into an RGB frame.
pub fn frame_from_image(image: DynamicImage) -> Frame {
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height)
}

/// View a frame as an `image` buffer.
///
/// Returns `None` if the pixel buffer does not match the dimensions.
pub fn frame_to_image(frame: &Frame) -> Option<RgbImage> {
    RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
}

/// Map ffmpeg's stderr from a failed start into a camera error.
pub fn classify_start_failure(stderr_lines: &[String]) -> CameraError {
    let detail = stderr_lines
        .iter()
        .rev()
        .find(|l| !l.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "ffmpeg exited before producing a frame".to_string());

    let lower = stderr_lines.join("\n").to_lowercase();
    if PERMISSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        CameraError::PermissionDenied(detail)
    } else {
        CameraError::DeviceUnavailable(detail)
    }
}

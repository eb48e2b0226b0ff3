//! Camera types and data structures.

use std::fmt;
use std::time::Instant;

/// Information about an available capture device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device specifier accepted by `--device`
    pub id: String,
    /// Human-readable device name
    pub name: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.name)
    }
}

/// Camera resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 1080p, the resolution the scanner asks the camera for by default.
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    /// Number of bytes in one RGB frame at this resolution.
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FULL_HD
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A frame snapshot at the camera's native resolution.
///
/// Pixels are tightly packed RGB, row-major. Frames are never mutated once
/// produced; cropping yields a new frame.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Number of bytes per pixel (RGB).
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Native resolution of this frame.
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// Whether the pixel buffer length matches the dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_bytes", &self.data.len())
            .finish()
    }
}

/// Settings for camera capture.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device name or index as understood by the platform capture API
    pub device: String,
    /// Requested capture resolution
    pub resolution: Resolution,
    /// Requested frame rate
    pub framerate: u32,
    /// How long to wait for the first frame before giving up
    pub warmup_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            resolution: Resolution::default(),
            framerate: 30,
            warmup_ms: 5000,
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Camera has not produced a frame yet")]
    NoFrame,

    #[error("Camera is already streaming")]
    AlreadyRunning,

    #[error("Camera is not open")]
    NotOpen,

    #[error("Invalid still image: {0}")]
    InvalidImage(String),
}

impl CameraError {
    /// Whether this error means the operator has to act (grant permission,
    /// plug in a device) before the camera can be used.
    pub fn is_device_access(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied(_) | CameraError::DeviceUnavailable(_)
        )
    }
}

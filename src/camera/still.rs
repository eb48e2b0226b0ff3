//! Camera stand-in that serves a single still image.

use std::path::{Path, PathBuf};

use super::frame_utils::frame_from_image;
use super::source::Camera;
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// Serves one fixed frame, e.g. a photo of the mark sheet taken earlier.
///
/// The requested resolution in `CameraSettings` is ignored; the still is
/// always delivered at its own native size.
#[derive(Debug, Clone)]
pub struct StillCamera {
    frame: Frame,
    origin: Option<PathBuf>,
    open: bool,
}

impl StillCamera {
    /// Wrap an already decoded frame.
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            frame,
            origin: None,
            open: false,
        }
    }

    /// Load a PNG or JPEG from disk.
    ///
    /// # Errors
    /// * `CameraError::DeviceUnavailable` - If the file cannot be read
    /// * `CameraError::InvalidImage` - If the file is not a decodable image
    pub fn from_path(path: &Path) -> Result<Self, CameraError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CameraError::DeviceUnavailable(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::InvalidImage(format!("'{}': {}", path.display(), e)))?;

        Ok(Self {
            frame: frame_from_image(image),
            origin: Some(path.to_path_buf()),
            open: false,
        })
    }
}

impl Camera for StillCamera {
    fn open(&mut self, _settings: &CameraSettings) -> Result<Resolution, CameraError> {
        if self.open {
            return Err(CameraError::AlreadyRunning);
        }
        if !self.frame.is_valid() {
            return Err(CameraError::InvalidImage(format!(
                "{}x{} frame with {} bytes",
                self.frame.width,
                self.frame.height,
                self.frame.data.len()
            )));
        }
        self.open = true;
        Ok(self.frame.resolution())
    }

    fn latest_frame(&self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotOpen);
        }
        Ok(self.frame.clone())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        match &self.origin {
            Some(path) => format!("still image {}", path.display()),
            None => format!("still frame {}", self.frame.resolution()),
        }
    }
}

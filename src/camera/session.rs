//! Scoped ownership of the camera for one workflow visit.

use super::source::Camera;
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// Sole owner of the camera while the scanning workflow is active.
///
/// The camera is opened by [`CaptureSession::acquire`] and closed exactly
/// once, either by [`CaptureSession::release`] or when the session is
/// dropped. Every exit path (early return, error, panic unwinding) goes
/// through `Drop`.
pub struct CaptureSession {
    camera: Box<dyn Camera>,
    resolution: Resolution,
    released: bool,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("camera", &self.camera.describe())
            .field("resolution", &self.resolution)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CaptureSession {
    /// Open the camera and wrap it in a session.
    ///
    /// # Errors
    /// Any `CameraError` from opening the device. `PermissionDenied` and
    /// `DeviceUnavailable` need operator action before a retry can succeed.
    pub fn acquire(
        mut camera: Box<dyn Camera>,
        settings: &CameraSettings,
    ) -> Result<Self, CameraError> {
        let resolution = camera.open(settings)?;
        log::info!("Capture session acquired: {}", camera.describe());
        Ok(Self {
            camera,
            resolution,
            released: false,
        })
    }

    /// Native resolution reported by the device when it was opened.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_active(&self) -> bool {
        !self.released && self.camera.is_open()
    }

    /// Explicitly end the session.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.camera.close();
        log::info!("Capture session released");
    }

    fn camera(&self) -> &dyn Camera {
        self.camera.as_ref()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Read the current frame of a session at native resolution.
///
/// Pure and repeatable: it copies the latest frame and leaves the stream
/// untouched.
pub fn snapshot(session: &CaptureSession) -> Result<Frame, CameraError> {
    if !session.is_active() {
        return Err(CameraError::NotOpen);
    }
    let frame = session.camera().latest_frame()?;
    if !frame.is_valid() {
        return Err(CameraError::NoFrame);
    }
    Ok(frame)
}

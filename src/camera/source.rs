//! The camera abstraction shared by the live and still backends.

use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// A source of frames that can be opened once and read many times.
///
/// Implementations must make `latest_frame` a pure read: calling it never
/// changes what the camera streams, and it may be called any number of
/// times while the camera is open.
pub trait Camera: Send {
    /// Acquire the underlying device and start streaming.
    ///
    /// Returns the native resolution frames will be delivered at.
    fn open(&mut self, settings: &CameraSettings) -> Result<Resolution, CameraError>;

    /// Copy of the most recent frame.
    fn latest_frame(&self) -> Result<Frame, CameraError>;

    /// Stop streaming and release the device. Safe to call when not open.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Short label for logs.
    fn describe(&self) -> String;
}

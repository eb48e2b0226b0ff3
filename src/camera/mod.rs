//! Camera access for the scanning workflow.
//!
//! - Device enumeration via [`list_devices`]
//! - Backends implementing [`Camera`]: [`FfmpegCamera`] (live) and
//!   [`StillCamera`] (an image file)
//! - Scoped ownership via [`CaptureSession`] and frame reads via [`snapshot`]

mod capture;
mod capture_loop;
mod device;
mod frame_utils;
mod session;
mod source;
mod still;
mod types;

pub use capture::FfmpegCamera;
pub use device::{list_devices, parse_avfoundation_list, parse_dshow_list};
pub use frame_utils::{frame_from_image, frame_to_image};
pub use session::{snapshot, CaptureSession};
pub use source::Camera;
pub use still::StillCamera;
pub use types::{CameraError, CameraInfo, CameraSettings, Frame, Resolution};

//! mark-scanner library crate.
//!
//! Camera capture, crop geometry, the scan state machine and the remote
//! client behind the `mark-scanner` binary.

pub mod artifact;
pub mod camera;
pub mod cli;
pub mod config;
pub mod crop;
pub mod encode;
pub mod orchestrator;
pub mod remote;
pub mod session;

pub use artifact::{DownloadHandle, SpreadsheetArtifact};
pub use crop::{CropTransform, DisplayRect, DisplaySize, NativeRect};
pub use orchestrator::{ScanError, ScanOrchestrator, ScanState};
pub use remote::{ScanClient, ScanMode, ScanRequest, ScanResult};

//! ScanOrchestrator - the auto/manual scanning state machine.
//!
//! Owns the capture session, the captured still, the committed selection
//! and the spreadsheet artifact. Every public action records failures into
//! the state instead of returning them, so the operator always sees a
//! message and the workflow never aborts.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact::SpreadsheetArtifact;
use crate::camera::{snapshot, Camera, CameraError, CameraSettings, CaptureSession, Frame};
use crate::crop::{extract, CropTransform, DisplayRect, DisplaySize};
use crate::encode::encode_png;
use crate::remote::{
    GridParams, RemoteError, ScanContext, ScanMode, ScanRequest, ScanResult, ScanService,
};

/// Operator-facing error taxonomy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    /// Camera permission denied or device missing; needs operator action.
    #[error("{0}")]
    DeviceAccess(String),

    /// Rejected locally, nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// Non-2xx response or transport failure.
    #[error("{0}")]
    Remote(String),

    /// The service answered but its spreadsheet payload was unreadable.
    #[error("{0}")]
    Decode(String),
}

impl From<CameraError> for ScanError {
    fn from(e: CameraError) -> Self {
        if e.is_device_access() {
            ScanError::DeviceAccess(e.to_string())
        } else {
            ScanError::Validation(e.to_string())
        }
    }
}

impl From<RemoteError> for ScanError {
    fn from(e: RemoteError) -> Self {
        if e.is_decode() {
            log::error!("{}", e);
            ScanError::Decode("The server returned a spreadsheet that could not be read".to_string())
        } else {
            ScanError::Remote(e.to_string())
        }
    }
}

/// States the workflow rests in between operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stable {
    /// Streaming, nothing captured.
    Idle,
    /// Manual mode with a still held.
    Captured,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    /// The camera could not be acquired. Cleared only by a successful retry.
    DeviceUnavailable(ScanError),
    Idle,
    Captured,
    /// A request is in flight; `from` is where it returns on failure.
    Submitting { from: Stable },
    /// Last action failed; `from` is preserved so the operator can retry.
    Error { error: ScanError, from: Stable },
}

impl ScanState {
    fn from_stable(stable: Stable) -> Self {
        match stable {
            Stable::Idle => ScanState::Idle,
            Stable::Captured => ScanState::Captured,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::DeviceUnavailable(_) => write!(f, "camera unavailable"),
            ScanState::Idle => write!(f, "idle"),
            ScanState::Captured => write!(f, "captured"),
            ScanState::Submitting { .. } => write!(f, "submitting"),
            ScanState::Error { .. } => write!(f, "error"),
        }
    }
}

/// A request that has left the state machine and awaits its response.
///
/// Hand it back to [`ScanOrchestrator::complete`] with the outcome.
#[derive(Debug)]
pub struct PendingScan {
    request: ScanRequest,
    mode: ScanMode,
}

impl PendingScan {
    pub fn request(&self) -> &ScanRequest {
        &self.request
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }
}

/// The scanning workflow for one visit.
#[derive(Debug)]
pub struct ScanOrchestrator {
    mode: ScanMode,
    state: ScanState,
    session: Option<CaptureSession>,
    frame: Option<Frame>,
    rect: Option<DisplayRect>,
    display: Option<DisplaySize>,
    grid: GridParams,
    artifact: SpreadsheetArtifact,
    context: Option<ScanContext>,
    require_context: bool,
    last_summary: Option<String>,
    info: Option<String>,
}

impl ScanOrchestrator {
    /// A workflow without a camera yet; call [`ScanOrchestrator::acquire`].
    pub fn new(artifact: SpreadsheetArtifact, grid: GridParams) -> Self {
        Self {
            mode: ScanMode::Auto,
            state: ScanState::Idle,
            session: None,
            frame: None,
            rect: None,
            display: None,
            grid,
            artifact,
            context: None,
            require_context: false,
            last_summary: None,
            info: None,
        }
    }

    /// Create the workflow and acquire the camera in one step.
    pub fn enter(
        camera: Box<dyn Camera>,
        settings: &CameraSettings,
        artifact: SpreadsheetArtifact,
        grid: GridParams,
    ) -> Self {
        let mut orchestrator = Self::new(artifact, grid);
        orchestrator.acquire(camera, settings);
        orchestrator
    }

    /// Attach exam/student identity, sent along with every scan.
    pub fn with_context(mut self, context: Option<ScanContext>) -> Self {
        self.context = context;
        self
    }

    /// Refuse to scan until a context is attached.
    pub fn require_context(mut self, required: bool) -> Self {
        self.require_context = required;
        self
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// The error currently shown to the operator, if any.
    pub fn error(&self) -> Option<&ScanError> {
        match &self.state {
            ScanState::DeviceUnavailable(e) | ScanState::Error { error: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, ScanState::Submitting { .. })
    }

    pub fn has_camera(&self) -> bool {
        self.session.as_ref().is_some_and(CaptureSession::is_active)
    }

    pub fn captured_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn selection(&self) -> Option<DisplayRect> {
        self.rect
    }

    pub fn display_size(&self) -> Option<DisplaySize> {
        self.display
    }

    pub fn grid(&self) -> GridParams {
        self.grid
    }

    pub fn artifact(&self) -> &SpreadsheetArtifact {
        &self.artifact
    }

    pub fn context(&self) -> Option<&ScanContext> {
        self.context.as_ref()
    }

    /// Summary of the last successful scan.
    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }

    /// Latest informational message (uploads, saves, ignored actions).
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Take the latest informational message so it is shown once.
    pub fn take_info(&mut self) -> Option<String> {
        self.info.take()
    }

    /// Open `camera` and make it the workflow's capture session.
    ///
    /// Any previous session is released first. On failure the workflow
    /// moves to `DeviceUnavailable` and stays there until a retry succeeds.
    pub fn acquire(&mut self, camera: Box<dyn Camera>, settings: &CameraSettings) {
        if self.is_submitting() {
            self.note("Wait for the current scan to finish");
            return;
        }
        if let Some(old) = self.session.take() {
            old.release();
        }
        self.frame = None;
        self.rect = None;

        match CaptureSession::acquire(camera, settings) {
            Ok(session) => {
                log::info!("Camera ready at {}", session.resolution());
                self.session = Some(session);
                self.state = ScanState::Idle;
            }
            Err(e) => {
                log::error!("Could not acquire camera: {}", e);
                self.state = ScanState::DeviceUnavailable(e.into());
            }
        }
    }

    /// Record that the camera could not even be constructed.
    ///
    /// Ignored while a scan is in flight; the current camera stays in use.
    pub fn camera_failed(&mut self, error: CameraError) {
        log::error!("Could not open camera: {}", error);
        if self.is_submitting() {
            self.note("Wait for the current scan to finish");
            return;
        }
        if let Some(old) = self.session.take() {
            old.release();
        }
        self.frame = None;
        self.rect = None;
        self.state = ScanState::DeviceUnavailable(error.into());
    }

    /// Switch between auto and manual.
    ///
    /// Discards the held still, the selection and any error. The artifact
    /// is never touched.
    pub fn set_mode(&mut self, mode: ScanMode) {
        log::info!("Mode set to {}", mode);
        self.mode = mode;
        self.frame = None;
        self.rect = None;
        self.info = None;
        self.state = match &self.state {
            ScanState::Submitting { .. } => ScanState::Submitting { from: Stable::Idle },
            ScanState::DeviceUnavailable(e) => ScanState::DeviceUnavailable(e.clone()),
            _ => ScanState::Idle,
        };
    }

    /// Take a still from the live stream (manual mode only).
    pub fn capture(&mut self) {
        if !self.ready_for_input() {
            return;
        }
        if self.mode != ScanMode::Manual {
            self.report(ScanError::Validation(
                "Capture is only used in manual mode; auto mode scans the live stream".to_string(),
            ));
            return;
        }
        if self.frame.is_some() {
            self.report(ScanError::Validation(
                "An image is already captured. Retake to discard it first".to_string(),
            ));
            return;
        }

        match self.snapshot() {
            Ok(frame) => {
                log::info!("Captured {}x{} still", frame.width, frame.height);
                self.frame = Some(frame);
                self.rect = None;
                self.state = ScanState::Captured;
            }
            Err(e) => self.report(e),
        }
    }

    /// Discard the held still and return to the live stream.
    pub fn retake(&mut self) {
        if !self.ready_for_input() {
            return;
        }
        self.frame = None;
        self.rect = None;
        self.state = ScanState::Idle;
    }

    /// Record the rendered size of the element showing the still.
    ///
    /// Read at submission time, so it may change after the selection was
    /// drawn.
    pub fn set_display_size(&mut self, display: DisplaySize) {
        self.display = Some(display);
    }

    /// Commit a selection drawn over the displayed still.
    pub fn set_selection(&mut self, rect: DisplayRect) {
        if !self.ready_for_input() {
            return;
        }
        if self.frame.is_none() {
            self.report(ScanError::Validation(
                "Capture an image before selecting a region".to_string(),
            ));
            return;
        }
        self.rect = Some(rect);
        self.clear_error();
    }

    /// Set the expected grid dimensions for auto mode.
    pub fn set_grid(&mut self, rows: u32, cols: u32) {
        match GridParams::new(rows, cols) {
            Ok(grid) => {
                self.grid = grid;
                self.clear_error();
            }
            Err(message) => self.report(ScanError::Validation(message)),
        }
    }

    /// Replace the artifact with a spreadsheet from disk.
    pub fn upload_artifact(&mut self, path: &Path) {
        if self.is_submitting() {
            self.note("Wait for the current scan to finish before uploading");
            return;
        }
        match self.artifact.load_upload(path) {
            Ok(()) => {
                self.clear_error();
                let message = format!("Loaded custom spreadsheet {}.", self.artifact.filename());
                self.note(&message);
            }
            Err(e) => self.report(ScanError::Validation(e.to_string())),
        }
    }

    /// Write the current artifact to `dest`, returning the written path.
    pub fn save_artifact(&mut self, dest: &Path) -> Option<PathBuf> {
        match self.artifact.save_to(dest) {
            Ok(path) => {
                let message = format!("Saved {} to {}", self.artifact.filename(), path.display());
                self.note(&message);
                Some(path)
            }
            Err(e) => {
                self.report(ScanError::Validation(e.to_string()));
                None
            }
        }
    }

    /// Package a scan and move to `Submitting`.
    ///
    /// Returns `None` without side effects while a scan is already in
    /// flight or the camera is unavailable. Validation failures move to
    /// `Error` and also return `None`; nothing is encoded or sent for them.
    pub fn begin_submit(&mut self) -> Option<PendingScan> {
        let from = match &self.state {
            ScanState::Submitting { .. } => {
                log::debug!("Scan already in flight, ignoring submit");
                return None;
            }
            ScanState::DeviceUnavailable(_) => {
                log::debug!("Camera unavailable, ignoring submit");
                return None;
            }
            ScanState::Idle => Stable::Idle,
            ScanState::Captured => Stable::Captured,
            ScanState::Error { from, .. } => *from,
        };

        match self.package() {
            Ok(request) => {
                log::info!(
                    "Submitting {} scan ({} image bytes, artifact {})",
                    self.mode,
                    request.image_png.len(),
                    if request.artifact.is_some() { "attached" } else { "new" }
                );
                self.state = ScanState::Submitting { from };
                self.info = None;
                Some(PendingScan {
                    request,
                    mode: self.mode,
                })
            }
            Err(error) => {
                log::warn!("Scan rejected: {}", error);
                self.state = ScanState::Error { error, from };
                None
            }
        }
    }

    /// Apply the outcome of a request started by [`ScanOrchestrator::begin_submit`].
    pub fn complete(&mut self, pending: PendingScan, outcome: Result<ScanResult, RemoteError>) {
        let from = match self.state {
            ScanState::Submitting { from } => from,
            _ => {
                log::warn!("Scan response arrived outside of a submission, ignoring");
                return;
            }
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = self.artifact.replace(result.artifact.clone()) {
                    log::warn!("Download handle not refreshed: {}", e);
                }
                let summary = result.summary();
                log::info!("{}", summary);
                self.last_summary = Some(summary);

                if pending.mode == ScanMode::Manual {
                    self.frame = None;
                    self.rect = None;
                }
                self.state = match self.frame {
                    Some(_) => ScanState::Captured,
                    None => ScanState::Idle,
                };
            }
            Err(e) => {
                let error = ScanError::from(e);
                log::warn!("Scan failed: {}", error);
                // A mode switch mid-flight already dropped the still.
                let from = if self.frame.is_none() { Stable::Idle } else { from };
                self.state = ScanState::Error { error, from };
            }
        }
    }

    /// Run one complete scan against `service`.
    ///
    /// Returns whether a request was sent.
    pub async fn submit<S: ScanService>(&mut self, service: &S) -> bool {
        let Some(pending) = self.begin_submit() else {
            return false;
        };
        let outcome = service.scan(pending.request()).await;
        self.complete(pending, outcome);
        true
    }

    /// Leave the workflow, releasing the camera.
    pub fn exit(&mut self) {
        if let Some(session) = self.session.take() {
            session.release();
        }
        self.frame = None;
        self.rect = None;
    }

    fn package(&self) -> Result<ScanRequest, ScanError> {
        if self.require_context && self.context.is_none() {
            return Err(ScanError::Validation(
                "Select an exam and student before scanning".to_string(),
            ));
        }

        let image_png = match self.mode {
            ScanMode::Auto => {
                let frame = self.snapshot()?;
                encode_png(&frame).map_err(|e| ScanError::Validation(e.to_string()))?
            }
            ScanMode::Manual => {
                let frame = self.frame.as_ref().ok_or_else(|| {
                    ScanError::Validation("Capture an image before scanning".to_string())
                })?;
                let rect = self.rect.ok_or_else(|| {
                    ScanError::Validation("Please select a region to scan".to_string())
                })?;
                let display = self.display.ok_or_else(|| {
                    ScanError::Validation("Preview size is unknown; set the display size".to_string())
                })?;

                let transform = CropTransform::new(display, frame.resolution())
                    .map_err(|e| ScanError::Validation(e.to_string()))?;
                let native = transform
                    .to_native(rect)
                    .map_err(|e| ScanError::Validation(e.to_string()))?;
                let cropped =
                    extract(frame, native).map_err(|e| ScanError::Validation(e.to_string()))?;
                log::debug!(
                    "Selection {:?} on {}x{} display -> {}x{} native crop",
                    rect,
                    display.width,
                    display.height,
                    cropped.width,
                    cropped.height
                );
                encode_png(&cropped).map_err(|e| ScanError::Validation(e.to_string()))?
            }
        };

        let artifact = self.artifact.bytes().map(<[u8]>::to_vec);
        let request = match self.mode {
            ScanMode::Auto => ScanRequest::auto(image_png, artifact, self.grid),
            ScanMode::Manual => ScanRequest::manual(image_png, artifact),
        };
        Ok(request.with_context(self.context.clone()))
    }

    fn snapshot(&self) -> Result<Frame, ScanError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ScanError::DeviceAccess("No camera is connected".to_string()))?;
        Ok(snapshot(session)?)
    }

    /// Whether frame/selection edits are accepted right now.
    fn ready_for_input(&mut self) -> bool {
        if self.is_submitting() {
            self.note("Wait for the current scan to finish");
            return false;
        }
        if matches!(self.state, ScanState::DeviceUnavailable(_)) {
            self.note("Camera unavailable. Use retry-camera after fixing access");
            return false;
        }
        true
    }

    fn stable(&self) -> Stable {
        match &self.state {
            ScanState::Captured => Stable::Captured,
            ScanState::Submitting { from } | ScanState::Error { from, .. } => *from,
            ScanState::Idle | ScanState::DeviceUnavailable(_) => Stable::Idle,
        }
    }

    /// Record an error without disturbing an in-flight scan or a missing
    /// camera; those states keep priority and the message goes to `info`.
    fn report(&mut self, error: ScanError) {
        log::warn!("{}", error);
        if matches!(
            self.state,
            ScanState::Submitting { .. } | ScanState::DeviceUnavailable(_)
        ) {
            self.info = Some(error.to_string());
            return;
        }
        let from = self.stable();
        self.state = ScanState::Error { error, from };
    }

    fn clear_error(&mut self) {
        if let ScanState::Error { from, .. } = self.state {
            self.state = ScanState::from_stable(from);
        }
    }

    fn note(&mut self, message: &str) {
        log::info!("{}", message);
        self.info = Some(message.to_string());
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.exit();
    }
}

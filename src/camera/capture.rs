//! Live camera backed by an ffmpeg child process.

use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::capture_loop::{ffmpeg_args, spawn_frame_reader, spawn_stderr_reader, StreamStatus};
use super::frame_utils::classify_start_failure;
use super::source::Camera;
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// Live camera handle.
///
/// Streams raw RGB frames out of ffmpeg; a background thread keeps the
/// latest frame in a shared buffer so snapshots never block on the device.
pub struct FfmpegCamera {
    /// Latest captured frame (shared with reader thread)
    frame_buffer: Arc<Mutex<Option<Frame>>>,
    /// Signal to stop the reader thread
    stop_signal: Arc<AtomicBool>,
    child: Option<Child>,
    reader_thread: Option<JoinHandle<()>>,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
    resolution: Option<Resolution>,
}

impl std::fmt::Debug for FfmpegCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegCamera")
            .field("resolution", &self.resolution)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCamera {
    pub fn new() -> Self {
        Self {
            frame_buffer: Arc::new(Mutex::new(None)),
            stop_signal: Arc::new(AtomicBool::new(false)),
            child: None,
            reader_thread: None,
            stderr_thread: None,
            resolution: None,
        }
    }

    fn spawn_ffmpeg(settings: &CameraSettings) -> Result<Child, CameraError> {
        let args = ffmpeg_args(settings);
        log::debug!("Spawning ffmpeg {}", args.join(" "));

        Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CameraError::DeviceUnavailable(
                        "ffmpeg not found. Install ffmpeg to use a live camera, or pass --image"
                            .to_string(),
                    )
                } else {
                    CameraError::DeviceUnavailable(format!("failed to start ffmpeg: {}", e))
                }
            })
    }

    /// Kill ffmpeg and join both reader threads, returning collected stderr.
    fn teardown(&mut self) -> Vec<String> {
        self.stop_signal.store(true, Ordering::SeqCst);

        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
        let stderr = self
            .stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if let Ok(mut buf) = self.frame_buffer.lock() {
            *buf = None;
        }
        self.resolution = None;
        stderr
    }
}

impl Camera for FfmpegCamera {
    /// Start ffmpeg and wait for the first frame.
    ///
    /// # Errors
    /// * `CameraError::AlreadyRunning` - If the camera is already streaming
    /// * `CameraError::PermissionDenied` - If the OS refused camera access
    /// * `CameraError::DeviceUnavailable` - If ffmpeg or the device is missing,
    ///   or no frame arrives within the warm-up window
    fn open(&mut self, settings: &CameraSettings) -> Result<Resolution, CameraError> {
        if self.is_open() {
            return Err(CameraError::AlreadyRunning);
        }

        self.stop_signal.store(false, Ordering::SeqCst);
        let mut child = Self::spawn_ffmpeg(settings)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status_tx, status_rx) = mpsc::channel();

        if let Some(stdout) = stdout {
            self.reader_thread = Some(spawn_frame_reader(
                stdout,
                settings.resolution,
                Arc::clone(&self.frame_buffer),
                Arc::clone(&self.stop_signal),
                status_tx,
            ));
        }
        self.stderr_thread = stderr.map(spawn_stderr_reader);
        self.child = Some(child);

        match status_rx.recv_timeout(Duration::from_millis(settings.warmup_ms)) {
            Ok(StreamStatus::FirstFrame) => {
                self.resolution = Some(settings.resolution);
                log::info!("Camera {} streaming at {}", settings.device, settings.resolution);
                Ok(settings.resolution)
            }
            Ok(StreamStatus::EndedEarly) | Err(RecvTimeoutError::Disconnected) => {
                let stderr = self.teardown();
                Err(classify_start_failure(&stderr))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.teardown();
                Err(CameraError::DeviceUnavailable(format!(
                    "no frame from camera {} within {} ms",
                    settings.device, settings.warmup_ms
                )))
            }
        }
    }

    fn latest_frame(&self) -> Result<Frame, CameraError> {
        if !self.is_open() {
            return Err(CameraError::NotOpen);
        }
        let buffer = self.frame_buffer.lock().map_err(|_| CameraError::NoFrame)?;
        buffer.clone().ok_or(CameraError::NoFrame)
    }

    fn close(&mut self) {
        if self.child.is_some() {
            self.teardown();
            log::info!("Camera stream stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.child.is_some() && self.resolution.is_some()
    }

    fn describe(&self) -> String {
        match self.resolution {
            Some(res) => format!("ffmpeg camera ({})", res),
            None => "ffmpeg camera (closed)".to_string(),
        }
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.close();
    }
}

//! Background reader thread for the ffmpeg frame stream.

use std::io::{BufRead, BufReader, Read};
use std::process::{ChildStderr, ChildStdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::types::{CameraSettings, Frame, Resolution};

/// First-frame report sent from the reader thread back to `open()`.
pub enum StreamStatus {
    /// A complete frame has been stored in the shared buffer.
    FirstFrame,
    /// ffmpeg closed its stdout before producing a full frame.
    EndedEarly,
}

/// Build the ffmpeg argument list for streaming raw RGB frames to stdout.
///
/// The output is always scaled to the requested resolution so that frame
/// boundaries in the byte stream are known in advance.
pub fn ffmpeg_args(settings: &CameraSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
    ];
    args.extend(input_args(settings));
    args.extend([
        "-vf".to_string(),
        format!(
            "scale={}:{}",
            settings.resolution.width, settings.resolution.height
        ),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-".to_string(),
    ]);
    args
}

/// Platform capture input arguments.
#[cfg(target_os = "macos")]
fn input_args(settings: &CameraSettings) -> Vec<String> {
    vec![
        "-f".into(),
        "avfoundation".into(),
        "-framerate".into(),
        settings.framerate.to_string(),
        "-video_size".into(),
        settings.resolution.to_string(),
        "-i".into(),
        format!("{}:none", settings.device),
    ]
}

#[cfg(target_os = "windows")]
fn input_args(settings: &CameraSettings) -> Vec<String> {
    vec![
        "-f".into(),
        "dshow".into(),
        "-framerate".into(),
        settings.framerate.to_string(),
        "-video_size".into(),
        settings.resolution.to_string(),
        "-i".into(),
        format!("video={}", settings.device),
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn input_args(settings: &CameraSettings) -> Vec<String> {
    let device = if settings.device.parse::<u32>().is_ok() {
        format!("/dev/video{}", settings.device)
    } else {
        settings.device.clone()
    };
    vec![
        "-f".into(),
        "v4l2".into(),
        "-framerate".into(),
        settings.framerate.to_string(),
        "-video_size".into(),
        settings.resolution.to_string(),
        "-i".into(),
        device,
    ]
}

/// Spawn the thread that slices ffmpeg's stdout into frames.
///
/// Only the most recent frame is kept. The first complete frame (or EOF
/// before one) is reported once through `status_tx`.
pub fn spawn_frame_reader(
    mut stdout: ChildStdout,
    resolution: Resolution,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    status_tx: Sender<StreamStatus>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let frame_len = resolution.rgb_frame_len();
        let mut reported = false;

        while !stop.load(Ordering::Relaxed) {
            let mut data = vec![0u8; frame_len];
            if stdout.read_exact(&mut data).is_err() {
                break;
            }

            if let Ok(mut buf) = buffer.lock() {
                *buf = Some(Frame::new(data, resolution.width, resolution.height));
            }

            if !reported {
                let _ = status_tx.send(StreamStatus::FirstFrame);
                reported = true;
            }
        }

        if !reported {
            let _ = status_tx.send(StreamStatus::EndedEarly);
        }
        log::debug!("ffmpeg frame reader exited");
    })
}

/// Spawn the thread that drains ffmpeg's stderr.
///
/// Lines are forwarded to the debug log and returned when the process exits,
/// so `open()` can classify start-up failures.
pub fn spawn_stderr_reader(stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        let mut lines = Vec::new();
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    log::debug!("[ffmpeg] {}", l);
                    lines.push(l);
                }
                Err(_) => break,
            }
        }
        lines
    })
}
